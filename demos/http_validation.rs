//! End-to-end validation against a live JSON-over-HTTP control plane
//!
//! Provisions one queue, waits for it to become ACTIVE, provisions it again
//! to confirm nothing changes, then disposes it.
//!
//! ## Environment
//!
//! - `CONVERGE_ENDPOINT` (required): Base URL of the control plane
//! - `CONVERGE_API_TOKEN` (required): Bearer token
//! - `CONVERGE_QUEUE_NAME` (required): Name of the throwaway queue
//! - `CONVERGE_CACHE_PATH` (optional): File cache for describe listings
//! - `CONVERGE_KEEP` (optional): Set to skip the final dispose
//!
//! Ctrl-C cancels in-flight calls, retry sleeps and polls.

mod logging;

use converge_core::config::{ApiConfig, CacheBackend, CacheConfig, EngineConfig};
use converge_core::resource::Attributes;
use converge_core::traits::{ApiError, PaginationSpec, ResourceKind};
use converge_core::{
    ApiRegistry, ConvergeEngine, Observation, OperationRequest, PollSpec, ProvisionMode,
    Resource, Result, Selector,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Queues with a CREATING → ACTIVE lifecycle
struct HttpQueueKind;

impl ResourceKind for HttpQueueKind {
    fn kind_name(&self) -> &str {
        "queue"
    }

    fn describe(&self, selector: &Selector<'_>) -> OperationRequest {
        let op = OperationRequest::new("list_queues", "Queues");
        match selector.resource().and_then(|r| r.desired_str("Name")) {
            Some(name) => op.param("NamePrefix", name),
            None => op,
        }
    }

    fn observe(&self, item: &Value) -> Result<Observation> {
        let id = item["QueueId"]
            .as_str()
            .ok_or_else(|| converge_core::Error::invalid_resource("queue without QueueId"))?;
        let status = item["Status"].as_str().unwrap_or(Observation::PRESENT);
        Ok(Observation::new(id, status, item.as_object().cloned().unwrap_or_default()))
    }

    fn matches(&self, desired: &Resource, observed: &Observation) -> bool {
        desired.desired.get("Name") == observed.attributes.get("Name")
    }

    fn create(&self, desired: &Resource) -> Result<OperationRequest> {
        Ok(OperationRequest::new("create_queue", "Queue").with_params(desired.desired.clone()))
    }

    fn diff(&self, _current: &Observation, _desired: &Resource) -> Result<Vec<OperationRequest>> {
        Ok(Vec::new())
    }

    fn delete(&self, current: &Observation) -> Result<OperationRequest> {
        Ok(OperationRequest::whole_response("delete_queue").param("QueueId", current.identity.clone()))
    }

    fn ignore_delete_error(&self, error: &ApiError) -> bool {
        error.code == "NotFound" || error.code.ends_with("NotFoundException")
    }

    fn ready_poll(&self) -> Option<PollSpec> {
        Some(
            PollSpec::until(["ACTIVE"])
                .permitting(["CREATING", "UPDATING"])
                .failing_on(["FAILED"])
                .with_timeout(Duration::from_secs(600))
                .with_interval(Duration::from_secs(10)),
        )
    }

    fn deletion_poll(&self) -> Option<PollSpec> {
        Some(PollSpec::until(["DELETED"]).with_timeout(Duration::from_secs(600)))
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    let api_config = ApiConfig::Http {
        endpoint: required("CONVERGE_ENDPOINT")?,
        api_token: required("CONVERGE_API_TOKEN")?,
        timeout_secs: 30,
        pagination: HashMap::from([(
            "list_queues".to_string(),
            PaginationSpec::new("NextToken", "NextToken"),
        )]),
    };
    let queue_name = required("CONVERGE_QUEUE_NAME")?;

    let mut config = EngineConfig::default();
    if let Ok(path) = env::var("CONVERGE_CACHE_PATH") {
        config.cache = CacheConfig {
            backend: CacheBackend::File { path: path.into() },
            ..CacheConfig::default()
        };
    }

    let registry = ApiRegistry::new();
    converge_http::register(&registry);
    let api = registry.create(&api_config)?;

    let token = CancellationToken::new();
    let (engine, mut events) = ConvergeEngine::from_config(api, config).await?;
    let engine = engine.with_cancellation(token.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!("[Event] {:?}", event);
        }
    });

    let kind = HttpQueueKind;
    let mut desired = Attributes::new();
    desired.insert("Name".to_string(), json!(queue_name));
    let mut queue = Resource::new(desired.clone());

    tracing::info!("Step 1: provisioning {}", queue_name);
    let outcome = engine.provision(&mut queue, &kind, ProvisionMode::Declarative).await?;
    tracing::info!("Provisioned ({:?}) as {:?}", outcome, queue.identity());

    tracing::info!("Step 2: provisioning again, expecting no change");
    let again = engine
        .provision(&mut Resource::new(desired), &kind, ProvisionMode::Declarative)
        .await?;
    if again.mutated() {
        anyhow::bail!("second provision mutated the queue: {:?}", again);
    }

    if env::var("CONVERGE_KEEP").is_err() {
        tracing::info!("Step 3: disposing {}", queue_name);
        let disposed = engine.dispose(Selector::from(&queue), &kind).await?;
        tracing::info!("Disposed: {:?}", disposed);
    }

    engine.flush().await?;
    tracing::info!("Validation finished after {} calls", engine.call_count());
    Ok(())
}
