//! Minimal embedding example for converge-core
//!
//! Converges one "bucket" against an in-process control plane: provision it,
//! provision it again (no change), drift it, dispose it twice. The second
//! dispose finds nothing to delete.

mod logging;

use async_trait::async_trait;
use converge_core::config::EngineConfig;
use converge_core::resource::Attributes;
use converge_core::traits::{ApiError, PaginationSpec, Params, RemoteApi, ResourceKind};
use converge_core::{
    ConvergeEngine, Observation, OperationRequest, ProvisionMode, Resource, Result, Selector,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-process control plane holding buckets
#[derive(Default)]
struct EmbeddedApi {
    buckets: Mutex<BTreeMap<String, Value>>,
}

#[async_trait]
impl RemoteApi for EmbeddedApi {
    async fn invoke(&self, method: &str, params: &Params) -> std::result::Result<Value, ApiError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| ApiError::new("InternalError", "state poisoned"))?;
        let name = params.get("Name").and_then(Value::as_str).unwrap_or_default().to_string();

        match method {
            "list_buckets" => Ok(json!({"Buckets": buckets.values().cloned().collect::<Vec<_>>()})),
            "create_bucket" => {
                let bucket = json!({
                    "Name": name,
                    "Versioning": params.get("Versioning").cloned().unwrap_or(json!(false)),
                });
                buckets.insert(name, bucket.clone());
                Ok(json!({"Bucket": bucket}))
            }
            "put_versioning" => match buckets.get_mut(&name) {
                Some(bucket) => {
                    bucket["Versioning"] = params.get("Versioning").cloned().unwrap_or(json!(false));
                    Ok(json!({}))
                }
                None => Err(ApiError::new("NoSuchBucket", name)),
            },
            "delete_bucket" => match buckets.remove(&name) {
                Some(_) => Ok(json!({})),
                None => Err(ApiError::new("NoSuchBucket", name)),
            },
            other => Err(ApiError::new("UnknownOperation", other)),
        }
    }

    fn pagination(&self, _method: &str) -> Option<PaginationSpec> {
        None
    }

    fn api_name(&self) -> &str {
        "embedded"
    }
}

/// Buckets are identified by name and have no lifecycle status
struct BucketKind;

impl ResourceKind for BucketKind {
    fn kind_name(&self) -> &str {
        "bucket"
    }

    fn describe(&self, _selector: &Selector<'_>) -> OperationRequest {
        OperationRequest::new("list_buckets", "Buckets")
    }

    fn observe(&self, item: &Value) -> Result<Observation> {
        let name = item["Name"]
            .as_str()
            .ok_or_else(|| converge_core::Error::invalid_resource("bucket without a name"))?;
        Ok(Observation::new(
            name,
            Observation::PRESENT,
            item.as_object().cloned().unwrap_or_default(),
        ))
    }

    fn matches(&self, desired: &Resource, observed: &Observation) -> bool {
        desired.desired_str("Name") == Some(observed.identity.as_str())
    }

    fn create(&self, desired: &Resource) -> Result<OperationRequest> {
        Ok(OperationRequest::new("create_bucket", "Bucket").with_params(desired.desired.clone()))
    }

    fn diff(&self, current: &Observation, desired: &Resource) -> Result<Vec<OperationRequest>> {
        let wanted = desired.desired.get("Versioning").cloned().unwrap_or(json!(false));
        if current.attributes.get("Versioning") == Some(&wanted) {
            return Ok(Vec::new());
        }
        Ok(vec![
            OperationRequest::whole_response("put_versioning")
                .param("Name", current.identity.clone())
                .param("Versioning", wanted),
        ])
    }

    fn delete(&self, current: &Observation) -> Result<OperationRequest> {
        Ok(OperationRequest::whole_response("delete_bucket").param("Name", current.identity.clone()))
    }

    fn ignore_delete_error(&self, error: &ApiError) -> bool {
        error.code == "NoSuchBucket"
    }
}

fn bucket(name: &str, versioning: bool) -> Resource {
    let mut desired = Attributes::new();
    desired.insert("Name".to_string(), json!(name));
    desired.insert("Versioning".to_string(), json!(versioning));
    Resource::new(desired)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    println!("=== Embedded converge-core Example ===\n");

    let api = Arc::new(EmbeddedApi::default());
    let (engine, mut event_rx) = ConvergeEngine::new(api, EngineConfig::default())?;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    let kind = BucketKind;

    println!("1. Provisioning bucket 'logs'...");
    let mut logs = bucket("logs", false);
    let outcome = engine.provision(&mut logs, &kind, ProvisionMode::Declarative).await?;
    println!("   -> {:?}, identity {:?}", outcome, logs.identity());

    println!("2. Provisioning again with a fresh object...");
    let outcome = engine
        .provision(&mut bucket("logs", false), &kind, ProvisionMode::Declarative)
        .await?;
    println!("   -> {:?}", outcome);

    println!("3. Enabling versioning...");
    let outcome = engine
        .provision(&mut bucket("logs", true), &kind, ProvisionMode::Declarative)
        .await?;
    println!("   -> {:?}", outcome);

    println!("4. Disposing twice...");
    let first = engine.dispose(Selector::from(&logs), &kind).await?;
    let second = engine.dispose(Selector::from(&logs), &kind).await?;
    println!("   -> {:?}, then {:?}", first, second);

    println!("\n{} physical calls in total", engine.call_count());

    drop(engine);
    event_listener.await?;

    println!("\n=== Embedding Successful ===");
    Ok(())
}
