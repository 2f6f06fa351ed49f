//! Test doubles and common utilities for convergence contract tests
//!
//! `QueueApi` is an in-memory control plane holding "queues". It paginates
//! its listing, counts calls per method, and can inject failures and scripted
//! status sequences. `QueueKind` binds the engine to it.

#![allow(dead_code)]

use async_trait::async_trait;
use converge_core::config::{EngineConfig, ExecutorConfig};
use converge_core::error::Result;
use converge_core::resource::Attributes;
use converge_core::traits::{ApiError, PaginationSpec, Params, RemoteApi, ResourceKind};
use converge_core::{Observation, OperationRequest, PollSpec, Resource, Selector};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared mutable state of a [`QueueApi`]
#[derive(Default)]
struct QueueState {
    /// Queues by id, in creation order
    queues: BTreeMap<String, Value>,
    /// Next id suffix
    next_id: usize,
    /// Physical calls per method
    calls: HashMap<String, usize>,
    /// Params of every call, in order
    log: Vec<(String, Params)>,
    /// Failures to return before serving a method
    failures: HashMap<String, VecDeque<ApiError>>,
    /// Statuses returned by successive listings, per queue id
    statuses: HashMap<String, VecDeque<String>>,
}

/// In-memory queue control plane
pub struct QueueApi {
    state: Arc<Mutex<QueueState>>,
    page_size: usize,
    initial_status: String,
    create_returns_queue: bool,
}

impl QueueApi {
    /// Create an empty control plane with a page size of 2
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            page_size: 2,
            initial_status: "ACTIVE".to_string(),
            create_returns_queue: true,
        }
    }

    /// A second handle onto the same queues and counters
    pub fn sharing_counters_with(other: &QueueApi) -> Self {
        Self {
            state: Arc::clone(&other.state),
            page_size: other.page_size,
            initial_status: other.initial_status.clone(),
            create_returns_queue: other.create_returns_queue,
        }
    }

    /// Listing page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Status of newly created queues
    pub fn with_initial_status(mut self, status: &str) -> Self {
        self.initial_status = status.to_string();
        self
    }

    /// Make create return an empty acknowledgement instead of the queue
    pub fn with_bare_create_response(mut self) -> Self {
        self.create_returns_queue = false;
        self
    }

    /// Seed a queue and return its id
    pub fn seed(&self, name: &str, tier: &str, status: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("q-{}", state.next_id);
        state.queues.insert(
            id.clone(),
            json!({"QueueId": id, "Name": name, "Tier": tier, "Status": status}),
        );
        id
    }

    /// Delete a queue behind the engine's back
    pub fn remove_out_of_band(&self, id: &str) {
        self.state.lock().unwrap().queues.remove(id);
    }

    /// Fail the next calls of `method` with `error`, `times` times
    pub fn fail_next(&self, method: &str, error: ApiError, times: usize) {
        let mut state = self.state.lock().unwrap();
        let queue = state.failures.entry(method.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Report these statuses for `id` on successive listings
    ///
    /// The last status sticks once the script runs out.
    pub fn script_statuses(&self, id: &str, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.statuses.insert(
            id.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Physical calls of `method` so far
    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.get(method).copied().unwrap_or(0)
    }

    /// Physical calls of any mutating method so far
    pub fn mutating_calls(&self) -> usize {
        self.calls("create_queue") + self.calls("update_queue") + self.calls("delete_queue")
    }

    /// Params sent to `method`, in order
    pub fn params_of(&self, method: &str) -> Vec<Params> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Number of queues currently held
    pub fn queue_count(&self) -> usize {
        self.state.lock().unwrap().queues.len()
    }

    /// Current record of queue `id`
    pub fn queue(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().queues.get(id).cloned()
    }

    fn list(&self, state: &mut QueueState, params: &Params) -> std::result::Result<Value, ApiError> {
        let start = match params.get("Marker") {
            None => 0,
            Some(Value::String(marker)) => marker
                .parse::<usize>()
                .map_err(|_| ApiError::new("ValidationError", "bad marker"))?,
            Some(_) => return Err(ApiError::new("ValidationError", "bad marker")),
        };
        let name_filter = params.get("Name").and_then(Value::as_str).map(str::to_string);

        let ids: Vec<String> = state.queues.keys().cloned().collect();
        for id in &ids {
            let next = match state.statuses.get_mut(id) {
                Some(script) if script.len() > 1 => script.pop_front(),
                Some(script) => script.front().cloned(),
                None => None,
            };
            if let (Some(status), Some(queue)) = (next, state.queues.get_mut(id)) {
                queue["Status"] = json!(status);
            }
        }

        let all: Vec<Value> = state
            .queues
            .values()
            .filter(|q| match &name_filter {
                Some(name) => q["Name"] == json!(name),
                None => true,
            })
            .cloned()
            .collect();

        let end = (start + self.page_size).min(all.len());
        let page: Vec<Value> = all.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();

        let mut response = json!({"Queues": page});
        if end < all.len() {
            response["NextMarker"] = json!(end.to_string());
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteApi for QueueApi {
    async fn invoke(&self, method: &str, params: &Params) -> std::result::Result<Value, ApiError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method.to_string()).or_default() += 1;
        state.log.push((method.to_string(), params.clone()));

        if let Some(error) = state.failures.get_mut(method).and_then(VecDeque::pop_front) {
            return Err(error);
        }

        match method {
            "list_queues" => self.list(&mut state, params),
            "create_queue" => {
                state.next_id += 1;
                let id = format!("q-{}", state.next_id);
                let queue = json!({
                    "QueueId": id,
                    "Name": params.get("Name").cloned().unwrap_or(Value::Null),
                    "Tier": params.get("Tier").cloned().unwrap_or(json!("standard")),
                    "Status": self.initial_status,
                });
                state.queues.insert(id, queue.clone());
                if self.create_returns_queue {
                    Ok(json!({"Queue": queue}))
                } else {
                    Ok(json!({"Queue": {"Accepted": true}}))
                }
            }
            "update_queue" => {
                let id = params.get("QueueId").and_then(Value::as_str).unwrap_or_default();
                let tier = params.get("Tier").cloned().unwrap_or(Value::Null);
                match state.queues.get_mut(id) {
                    Some(queue) => {
                        queue["Tier"] = tier;
                        Ok(json!({"Queue": queue.clone()}))
                    }
                    None => Err(ApiError::new("QueueNotFound", format!("{} does not exist", id))),
                }
            }
            "delete_queue" => {
                let id = params.get("QueueId").and_then(Value::as_str).unwrap_or_default();
                match state.queues.remove(id) {
                    Some(_) => Ok(json!({})),
                    None => Err(ApiError::new("QueueNotFound", format!("{} does not exist", id))),
                }
            }
            other => Err(ApiError::new("UnknownOperation", other.to_string())),
        }
    }

    fn pagination(&self, method: &str) -> Option<PaginationSpec> {
        match method {
            "list_queues" => Some(PaginationSpec::new("Marker", "NextMarker")),
            _ => None,
        }
    }

    fn api_name(&self) -> &str {
        "queues"
    }
}

/// Resource kind binding for [`QueueApi`] queues, matched by name
#[derive(Default)]
pub struct QueueKind {
    pub ready: Option<PollSpec>,
    pub deletion: Option<PollSpec>,
    pub ignore_not_found: bool,
    pub trailing_update: Option<OperationRequest>,
}

impl QueueKind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ready_poll(mut self, spec: PollSpec) -> Self {
        self.ready = Some(spec);
        self
    }

    pub fn with_deletion_poll(mut self, spec: PollSpec) -> Self {
        self.deletion = Some(spec);
        self
    }

    pub fn ignoring_not_found(mut self) -> Self {
        self.ignore_not_found = true;
        self
    }

    /// Append `op` to every non-empty diff
    pub fn with_trailing_update(mut self, op: OperationRequest) -> Self {
        self.trailing_update = Some(op);
        self
    }
}

impl ResourceKind for QueueKind {
    fn kind_name(&self) -> &str {
        "queue"
    }

    fn describe(&self, _selector: &Selector<'_>) -> OperationRequest {
        OperationRequest::new("list_queues", "Queues")
    }

    fn observe(&self, item: &Value) -> Result<Observation> {
        let identity = item["QueueId"]
            .as_str()
            .ok_or_else(|| converge_core::Error::invalid_resource("queue without QueueId"))?;
        let status = item["Status"].as_str().unwrap_or(Observation::PRESENT);
        let attributes = item.as_object().cloned().unwrap_or_default();
        Ok(Observation::new(identity, status, attributes))
    }

    fn observe_created(&self, item: &Value) -> Option<Observation> {
        item.get("QueueId")?;
        self.observe(item).ok()
    }

    fn matches(&self, desired: &Resource, observed: &Observation) -> bool {
        desired.desired.get("Name") == observed.attributes.get("Name")
    }

    fn create(&self, desired: &Resource) -> Result<OperationRequest> {
        Ok(OperationRequest::new("create_queue", "Queue").with_params(desired.desired.clone()))
    }

    fn diff(&self, current: &Observation, desired: &Resource) -> Result<Vec<OperationRequest>> {
        let mut ops = match desired.desired.get("Tier") {
            Some(tier) if current.attributes.get("Tier") != Some(tier) => vec![
                OperationRequest::new("update_queue", "Queue")
                    .param("QueueId", current.identity.clone())
                    .param("Tier", tier.clone()),
            ],
            _ => Vec::new(),
        };
        if let (false, Some(op)) = (ops.is_empty(), &self.trailing_update) {
            ops.push(op.clone());
        }
        Ok(ops)
    }

    fn delete(&self, current: &Observation) -> Result<OperationRequest> {
        Ok(OperationRequest::whole_response("delete_queue")
            .param("QueueId", current.identity.clone()))
    }

    fn ignore_delete_error(&self, error: &ApiError) -> bool {
        self.ignore_not_found && error.code == "QueueNotFound"
    }

    fn ready_poll(&self) -> Option<PollSpec> {
        self.ready.clone()
    }

    fn deletion_poll(&self) -> Option<PollSpec> {
        self.deletion.clone()
    }
}

/// Desired queue with a name and tier
pub fn desired_queue(name: &str, tier: &str) -> Resource {
    let mut attrs = Attributes::new();
    attrs.insert("Name".to_string(), json!(name));
    attrs.insert("Tier".to_string(), json!(tier));
    Resource::new(attrs)
}

/// Engine configuration with fast retries
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        executor: ExecutorConfig {
            backoff_unit_ms: 10,
            retry_delay_ms: 10,
            ..ExecutorConfig::default()
        },
        ..EngineConfig::default()
    }
}

/// Poll spec waiting for ACTIVE with short timings
pub fn active_within(timeout: Duration, interval: Duration) -> PollSpec {
    PollSpec::until(["ACTIVE"])
        .failing_on(["FAILED"])
        .with_timeout(timeout)
        .with_interval(interval)
}
