//! Contract Test: Cancellation
//!
//! Constraints verified:
//! - A cancelled token aborts an in-flight remote call
//! - A cancelled token aborts retry sleeps promptly
//! - A cancelled token aborts status polls promptly
//! - A token cancelled up front prevents any call
//! - Cancellation is reported as Cancelled, not as a timeout
//!
//! If this test fails, shutdown waits out long backoffs and polls.

mod common;

use async_trait::async_trait;
use common::*;
use converge_core::config::ExecutorConfig;
use converge_core::{
    ApiError, ConvergeEngine, Error, Observation, OperationRequest, PaginationSpec, Params,
    ProvisionMode, RemoteApi, RequestExecutor, Resource,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Remote API whose calls never complete
#[derive(Default)]
struct HangingApi {
    started: AtomicUsize,
}

#[async_trait]
impl RemoteApi for HangingApi {
    async fn invoke(&self, _method: &str, _params: &Params) -> Result<Value, ApiError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    fn pagination(&self, _method: &str) -> Option<PaginationSpec> {
        None
    }

    fn api_name(&self) -> &str {
        "hanging"
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_in_flight_call() {
    let api = Arc::new(HangingApi::default());
    let token = CancellationToken::new();
    let executor = RequestExecutor::new(api.clone(), ExecutorConfig::default())
        .unwrap()
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = executor
        .collect(OperationRequest::new("list_queues", "Queues"))
        .await;
    canceller.await.unwrap();

    match result {
        Err(Error::Cancelled { operation }) => assert_eq!(operation, "list_queues"),
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert_eq!(api.started.load(Ordering::SeqCst), 1);
    assert_eq!(executor.call_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_retry_sleep() {
    let api = Arc::new(QueueApi::new());
    api.fail_next("list_queues", ApiError::new("InternalError", "boom"), 100);
    let token = CancellationToken::new();
    let config = ExecutorConfig {
        retry_delay_ms: 60_000,
        ..ExecutorConfig::default()
    };
    let executor = RequestExecutor::new(api.clone(), config)
        .unwrap()
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = executor
        .collect(OperationRequest::new("list_queues", "Queues"))
        .await;
    canceller.await.unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!err.is_timeout());
    assert_eq!(api.calls("list_queues"), 1);
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn cancelled_token_prevents_calls() {
    let api = Arc::new(QueueApi::new());
    let token = CancellationToken::new();
    token.cancel();
    let executor = RequestExecutor::new(api.clone(), ExecutorConfig::default())
        .unwrap()
        .with_cancellation(token);

    let result = executor
        .collect(OperationRequest::new("list_queues", "Queues"))
        .await;

    assert!(matches!(result, Err(Error::Cancelled { .. })));
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_status_poll() {
    let api = Arc::new(QueueApi::new());
    let id = api.seed("orders", "standard", "CREATING");
    let token = CancellationToken::new();
    let (engine, _events) = ConvergeEngine::new(api.clone(), fast_config()).unwrap();
    let engine = engine.with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        token.cancel();
    });

    let mut queue = Resource::from_observation(&Observation::new(&id, "CREATING", Map::new()));
    let result = engine
        .wait_for_status(
            &mut queue,
            &QueueKind::new(),
            &active_within(Duration::from_secs(3600), Duration::from_secs(5)),
        )
        .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(Error::Cancelled { .. })));
    // Polls at 0s, 5s and 10s; cancelled during the following sleep
    assert_eq!(api.calls("list_queues"), 3);
}

#[tokio::test]
async fn cancelled_provision_makes_no_mutation() {
    let api = Arc::new(QueueApi::new());
    let token = CancellationToken::new();
    token.cancel();
    let (engine, _events) = ConvergeEngine::new(api.clone(), fast_config()).unwrap();
    let engine = engine.with_cancellation(token);

    let mut queue = desired_queue("orders", "standard");
    let result = engine
        .provision(&mut queue, &QueueKind::new(), ProvisionMode::Declarative)
        .await;

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(api.mutating_calls(), 0);
}
