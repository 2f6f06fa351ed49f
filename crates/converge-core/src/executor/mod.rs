//! Request executor
//!
//! The executor turns one logical [`OperationRequest`] into as many physical
//! calls as it takes: one per page, plus retries. It owns every retry, sleep
//! and pagination decision; [`RemoteApi`] implementations only ever make a
//! single call.
//!
//! ## Flow
//!
//! ```text
//! execute(op) ──► Items ──next()──► invoke ──ok──► extract_page ──► buffer
//!                               ▲          │
//!                               │          └─err──► ignore? ──yes──► end
//!                               │                     │
//!                               │                     └─no──► classify
//!                               │                               │
//!                               └──── sleep ◄── charge budget ◄─┘
//! ```
//!
//! Every suspension point (the call itself and the retry sleep) races the
//! executor's cancellation token.

mod budget;
mod classify;
mod payload;
mod request;

pub use budget::RetryBudget;
pub use classify::{ErrorClassifier, FailureClass};
pub use payload::Payload;
pub use request::{OperationRequest, PayloadKey};

use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::traits::{ApiError, PaginationSpec, Params, RemoteApi};
use payload::extract_page;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback deciding that a failure ends the sequence successfully
pub type IgnoreFn<'a> = Box<dyn Fn(&ApiError) -> bool + Send + Sync + 'a>;

/// Executes logical operations against one remote API
///
/// ## State
///
/// Each executor has its own call counter and cancellation token. Nothing is
/// process-wide, so independent executors in one process never interfere.
pub struct RequestExecutor {
    /// Remote API for physical calls
    api: Arc<dyn RemoteApi>,

    /// Retry and logging settings
    config: ExecutorConfig,

    /// Error signal classifier
    classifier: ErrorClassifier,

    /// Physical calls issued, retries included
    calls: AtomicU64,

    /// Aborts in-flight calls and sleeps
    cancel: CancellationToken,
}

impl RequestExecutor {
    /// Create a new executor
    ///
    /// # Parameters
    ///
    /// - `api`: Remote API implementation
    /// - `config`: Executor configuration
    pub fn new(api: Arc<dyn RemoteApi>, config: ExecutorConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            api,
            classifier: ErrorClassifier::from_config(&config),
            config,
            calls: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cancellation token honored by this executor
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Number of physical calls issued so far, retries included
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Remote API behind this executor
    pub fn api(&self) -> &dyn RemoteApi {
        self.api.as_ref()
    }

    /// Start a fresh item sequence for `op`
    ///
    /// Nothing is called until the first [`Items::next`].
    pub fn execute(&self, op: OperationRequest) -> Items<'_> {
        Items::new(self, op, None)
    }

    /// Start a fresh item sequence, ending it quietly on ignored failures
    ///
    /// # Parameters
    ///
    /// - `op`: Operation to execute
    /// - `ignore`: Returns true for failures that should end the sequence
    ///   successfully instead of being retried or raised
    pub fn execute_ignoring<'a, F>(&'a self, op: OperationRequest, ignore: F) -> Items<'a>
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'a,
    {
        Items::new(self, op, Some(Box::new(ignore)))
    }

    /// Execute `op` and collect every item
    pub async fn collect(&self, op: OperationRequest) -> Result<Vec<Value>> {
        self.execute(op).try_collect().await
    }

    /// Execute `op` and require exactly one item
    ///
    /// # Errors
    ///
    /// - [`Error::NoValues`] if the sequence is empty
    /// - [`Error::TooManyValues`] if it has more than one item
    pub async fn execute_single(&self, op: OperationRequest) -> Result<Value> {
        let method = op.method.clone();
        let mut items = self.collect(op).await?;

        match items.len() {
            0 => Err(Error::NoValues(method)),
            1 => Ok(items.remove(0)),
            count => Err(Error::TooManyValues {
                operation: method,
                count,
            }),
        }
    }

    /// Issue one page request, retrying within `budget`
    ///
    /// Returns `Ok(None)` when the ignore callback accepted a failure.
    async fn call_with_retry(
        &self,
        op: &OperationRequest,
        params: &Params,
        budget: &mut RetryBudget,
        ignore: Option<&IgnoreFn<'_>>,
    ) -> Result<Option<Value>> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(op));
            }

            self.calls.fetch_add(1, Ordering::SeqCst);
            info!("Calling {}::{}", self.api.api_name(), op.method);
            let attempted = serde_json::Value::Object(params.clone()).to_string();
            if self.config.log_params {
                debug!("{} params: {}", op.method, attempted);
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(op)),
                result = self.api.invoke(&op.method, params) => result,
            };

            let err = match result {
                Ok(response) => return Ok(Some(response)),
                Err(err) => err,
            };

            if ignore.is_some_and(|accept| accept(&err)) {
                debug!("Ignoring failure of {}: {}", op.method, err);
                return Ok(None);
            }

            let class = if op.instant_raise {
                FailureClass::Permanent
            } else {
                self.classifier.classify(&err)
            };

            if class == FailureClass::Permanent {
                error!("{} failed permanently: {}", op.method, err);
                return Err(Error::Permanent {
                    operation: op.method.clone(),
                    params: attempted,
                    source: err,
                });
            }

            let Some(delay) = budget.charge(class) else {
                error!(
                    "{} exhausted its retry budget ({}/{} units): {}",
                    op.method,
                    budget.spent(),
                    budget.ceiling(),
                    err
                );
                return Err(Error::RetryBudgetExhausted {
                    operation: op.method.clone(),
                    params: attempted,
                    spent: budget.spent(),
                    ceiling: budget.ceiling(),
                    last_error: err,
                });
            };

            warn!(
                "{} failed ({:?}, attempt {}): {}. Retrying in {:?}",
                op.method,
                class,
                budget.failures(),
                err,
                delay
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(op)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn cancelled(&self, op: &OperationRequest) -> Error {
        info!("{} cancelled", op.method);
        Error::Cancelled {
            operation: op.method.clone(),
        }
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("api", &self.api.api_name())
            .field("calls", &self.call_count())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Pagination progress of an [`Items`] sequence
#[derive(Debug)]
enum PageState {
    /// No page requested yet
    Start,
    /// Next page starts at this cursor
    Continue(Value),
    /// No more pages (or the sequence failed)
    Done,
}

/// Lazy, finite sequence of items produced by one `execute` call
///
/// Pages are requested on demand. After an error the sequence is fused: every
/// further `next` returns `Ok(None)` without calling the API.
pub struct Items<'a> {
    executor: &'a RequestExecutor,
    op: OperationRequest,
    rules: Option<PaginationSpec>,
    ignore: Option<IgnoreFn<'a>>,
    budget: RetryBudget,
    buffer: VecDeque<Value>,
    state: PageState,
}

impl<'a> Items<'a> {
    fn new(executor: &'a RequestExecutor, op: OperationRequest, ignore: Option<IgnoreFn<'a>>) -> Self {
        let rules = executor.api.pagination(&op.method);
        Self {
            budget: RetryBudget::from_config(&executor.config),
            executor,
            op,
            rules,
            ignore,
            buffer: VecDeque::new(),
            state: PageState::Start,
        }
    }

    /// Next item, fetching the next page when the buffer runs dry
    pub async fn next(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            let cursor = match std::mem::replace(&mut self.state, PageState::Done) {
                PageState::Done => return Ok(None),
                PageState::Start => None,
                PageState::Continue(cursor) => Some(cursor),
            };

            let mut params = self.op.params.clone();
            if let (Some(rules), Some(cursor)) = (&self.rules, cursor) {
                if !rules.is_initial(&cursor) {
                    params.insert(rules.request_key.clone(), cursor);
                }
            }

            let response = match self
                .executor
                .call_with_retry(&self.op, &params, &mut self.budget, self.ignore.as_ref())
                .await?
            {
                Some(response) => response,
                None => return Ok(None),
            };

            let page = extract_page(&self.op, response, self.rules.as_ref())?;
            debug!(
                "{} page yielded {} items",
                self.op.method,
                page.items.len()
            );
            self.buffer.extend(page.items);

            if let Some(rules) = &self.rules {
                if !rules.is_terminal(&page.next_cursor) {
                    self.state = PageState::Continue(page.next_cursor);
                }
            }
        }
    }

    /// Drain the sequence into a vector
    pub async fn try_collect(mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Operation this sequence executes
    pub fn operation(&self) -> &OperationRequest {
        &self.op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Pops one scripted result per call
    struct Script {
        results: Mutex<VecDeque<std::result::Result<Value, ApiError>>>,
        seen: Mutex<Vec<Params>>,
        rules: Option<PaginationSpec>,
    }

    impl Script {
        fn new(results: Vec<std::result::Result<Value, ApiError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                seen: Mutex::new(Vec::new()),
                rules: None,
            }
        }

        fn paged(mut self, rules: PaginationSpec) -> Self {
            self.rules = Some(rules);
            self
        }
    }

    #[async_trait]
    impl RemoteApi for Script {
        async fn invoke(&self, _method: &str, params: &Params) -> std::result::Result<Value, ApiError> {
            self.seen.lock().unwrap().push(params.clone());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::new("ScriptExhausted", "no more results")))
        }

        fn pagination(&self, _method: &str) -> Option<PaginationSpec> {
            self.rules.clone()
        }

        fn api_name(&self) -> &str {
            "script"
        }
    }

    fn executor(api: Arc<Script>) -> RequestExecutor {
        RequestExecutor::new(api, ExecutorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_initial_cursor_omitted_and_next_cursor_sent() {
        let api = Arc::new(
            Script::new(vec![
                Ok(json!({"Items": [1], "NextMarker": "m2"})),
                Ok(json!({"Items": [2], "NextMarker": ""})),
            ])
            .paged(
                PaginationSpec::new("Marker", "NextMarker")
                    .with_initial(json!(""))
                    .with_terminal(json!("")),
            ),
        );
        let exec = executor(Arc::clone(&api));

        let items = exec.collect(OperationRequest::new("list", "Items")).await.unwrap();

        assert_eq!(items, vec![json!(1), json!(2)]);
        let seen = api.seen.lock().unwrap();
        assert!(!seen[0].contains_key("Marker"));
        assert_eq!(seen[1].get("Marker"), Some(&json!("m2")));
        assert_eq!(exec.call_count(), 2);
    }

    #[tokio::test]
    async fn test_items_are_lazy() {
        let api = Arc::new(Script::new(vec![Ok(json!({"Items": [1, 2]}))]));
        let exec = executor(Arc::clone(&api));

        let mut items = exec.execute(OperationRequest::new("list", "Items"));
        assert_eq!(exec.call_count(), 0);

        assert_eq!(items.next().await.unwrap(), Some(json!(1)));
        assert_eq!(items.next().await.unwrap(), Some(json!(2)));
        assert_eq!(items.next().await.unwrap(), None);
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sequence_is_fused_after_error() {
        let api = Arc::new(Script::new(vec![
            Ok(json!({"Wrong": []})),
            Ok(json!({"Items": [1]})),
        ]));
        let exec = executor(Arc::clone(&api));

        let mut items = exec.execute(OperationRequest::new("list", "Items"));
        assert!(matches!(items.next().await, Err(Error::UnsupportedShape { .. })));
        assert_eq!(items.next().await.unwrap(), None);
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn test_instant_raise_skips_retry() {
        let api = Arc::new(Script::new(vec![Err(ApiError::new("Throttling", "Rate exceeded"))]));
        let exec = executor(Arc::clone(&api));

        let result = exec
            .collect(OperationRequest::new("list", "Items").instant_raise())
            .await;

        assert!(matches!(result, Err(Error::Permanent { .. })));
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_single() {
        let api = Arc::new(Script::new(vec![
            Ok(json!({"Item": {"id": "a"}})),
            Ok(json!({"Items": []})),
            Ok(json!({"Items": [1, 2]})),
        ]));
        let exec = executor(Arc::clone(&api));

        let one = exec.execute_single(OperationRequest::new("get", "Item")).await.unwrap();
        assert_eq!(one, json!({"id": "a"}));

        let none = exec.execute_single(OperationRequest::new("list", "Items")).await;
        assert!(matches!(none, Err(Error::NoValues(_))));

        let many = exec.execute_single(OperationRequest::new("list", "Items")).await;
        assert!(matches!(many, Err(Error::TooManyValues { count: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_reissues_same_cursor() {
        let api = Arc::new(
            Script::new(vec![
                Ok(json!({"Items": [1], "Next": "p2"})),
                Err(ApiError::new("Throttling", "Rate exceeded")),
                Ok(json!({"Items": [2]})),
            ])
            .paged(PaginationSpec::symmetric("Next")),
        );
        let exec = executor(Arc::clone(&api));

        let items = exec.collect(OperationRequest::new("list", "Items")).await.unwrap();

        assert_eq!(items, vec![json!(1), json!(2)]);
        let seen = api.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].get("Next"), Some(&json!("p2")));
        assert_eq!(seen[2].get("Next"), Some(&json!("p2")));
    }

    #[tokio::test]
    async fn test_permanent_error_carries_page_cursor() {
        let api = Arc::new(
            Script::new(vec![
                Ok(json!({"Items": [1], "Next": "p2"})),
                Err(ApiError::new("AccessDenied", "not on page two")),
            ])
            .paged(PaginationSpec::symmetric("Next")),
        );
        let exec = executor(Arc::clone(&api));

        let result = exec
            .collect(OperationRequest::new("list", "Items").param("Owner", "me"))
            .await;

        match result {
            Err(Error::Permanent { params, .. }) => {
                let sent: Value = serde_json::from_str(&params).unwrap();
                assert_eq!(sent, json!({"Owner": "me", "Next": "p2"}));
            }
            other => panic!("expected a permanent error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_logged_params_do_not_change_the_call() {
        let api = Arc::new(Script::new(vec![Ok(json!({"Items": [1]}))]));
        let config = ExecutorConfig {
            log_params: true,
            ..ExecutorConfig::default()
        };
        let exec = RequestExecutor::new(Arc::clone(&api) as Arc<dyn RemoteApi>, config).unwrap();

        let items = exec
            .collect(OperationRequest::new("list", "Items").param("Owner", "me"))
            .await
            .unwrap();

        assert_eq!(items, vec![json!(1)]);
        assert_eq!(api.seen.lock().unwrap()[0].get("Owner"), Some(&json!("me")));
    }
}
