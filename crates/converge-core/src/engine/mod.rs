//! Convergence engine
//!
//! The ConvergeEngine bundles one remote API with its executor, optional
//! describe cache and poller defaults, and reports every convergence result
//! on an event channel.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌────────────────┐
//!  caller ──────────►│ ConvergeEngine │──── EngineEvent ───► receiver
//!                    └────────────────┘
//!                            │
//!         ┌──────────────────┼───────────────────┐
//!         ▼                  ▼                   ▼
//! ┌───────────────┐  ┌───────────────┐   ┌───────────────┐
//! │  Convergence  │  │ StatusPoller  │   │ ResourceCache │
//! │  Controller   │  │               │   │  (optional)   │
//! └───────────────┘  └───────────────┘   └───────────────┘
//!         │                  │
//!         └────────┬─────────┘
//!                  ▼
//!         ┌─────────────────┐
//!         │ RequestExecutor │──► RemoteApi
//!         └─────────────────┘
//! ```
//!
//! ## Events
//!
//! Events are advisory. The channel is bounded; when it is full, events are
//! dropped with a warning rather than blocking a convergence.

use crate::cache;
use crate::config::EngineConfig;
use crate::controller::{ConvergenceController, DisposeOutcome, ProvisionMode, ProvisionOutcome};
use crate::error::Result;
use crate::executor::{Items, OperationRequest, RequestExecutor};
use crate::poller::{PollOutcome, PollSpec, StatusPoller};
use crate::resource::{Resource, Selector};
use crate::traits::{ApiError, RemoteApi, ResourceCache, ResourceKind};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Events emitted by the ConvergeEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A resource was created
    Created { kind: String, identity: String },

    /// An existing resource was updated
    Updated {
        kind: String,
        identity: String,
        changes: usize,
    },

    /// A resource already matched its desired state
    Unchanged { kind: String, identity: String },

    /// An existing resource was adopted as-is
    Adopted { kind: String, identity: String },

    /// A resource was deleted
    Deleted { kind: String, identity: String },

    /// Disposal found nothing to delete
    AlreadyAbsent { kind: String },

    /// A status poll ended successfully
    StatusReached {
        kind: String,
        identity: String,
        status: String,
    },

    /// A provision or dispose call failed
    ConvergeFailed { kind: String, error: String },
}

/// Remote resource convergence engine
///
/// ## Lifecycle
///
/// 1. Create with [`ConvergeEngine::new()`] or [`ConvergeEngine::from_config()`]
/// 2. Call [`provision`](Self::provision), [`dispose`](Self::dispose) and
///    friends as needed
/// 3. Call [`flush`](Self::flush) before exit when a file cache is used
pub struct ConvergeEngine {
    /// Executor for every remote call
    executor: RequestExecutor,

    /// Describe cache
    cache: Option<Arc<dyn ResourceCache>>,

    /// Engine configuration
    config: EngineConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ConvergeEngine {
    /// Create a new engine without a cache
    ///
    /// # Parameters
    ///
    /// - `api`: Remote API implementation
    /// - `config`: Engine configuration (its cache section is ignored)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        api: Arc<dyn RemoteApi>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            executor: RequestExecutor::new(api, config.executor.clone())?,
            cache: None,
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Create a new engine, opening the cache its configuration describes
    pub async fn from_config(
        api: Arc<dyn RemoteApi>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let cache = cache::open(&config.cache).await?;
        let (mut engine, rx) = Self::new(api, config)?;
        engine.cache = cache;
        Ok((engine, rx))
    }

    /// Use `cache` for describe listings
    pub fn with_cache(mut self, cache: Arc<dyn ResourceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Abort in-flight calls, retry sleeps and polls when `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(token);
        self
    }

    /// Executor behind this engine
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Physical calls issued so far, retries included
    pub fn call_count(&self) -> u64 {
        self.executor.call_count()
    }

    /// Start a lazy item sequence for `op`
    pub fn execute(&self, op: OperationRequest) -> Items<'_> {
        self.executor.execute(op)
    }

    /// Start a lazy item sequence that ends quietly on ignored failures
    pub fn execute_ignoring<'a, F>(&'a self, op: OperationRequest, ignore: F) -> Items<'a>
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'a,
    {
        self.executor.execute_ignoring(op, ignore)
    }

    /// Execute `op` and require exactly one item
    pub async fn execute_single(&self, op: OperationRequest) -> Result<Value> {
        self.executor.execute_single(op).await
    }

    /// Ensure the remote resource matches `desired`
    ///
    /// See [`ConvergenceController::provision`].
    pub async fn provision(
        &self,
        desired: &mut Resource,
        kind: &dyn ResourceKind,
        mode: ProvisionMode,
    ) -> Result<ProvisionOutcome> {
        let result = self.controller().provision(desired, kind, mode).await;

        match &result {
            Ok(outcome) => {
                let kind = kind.kind_name().to_string();
                let identity = desired.identity().unwrap_or_default().to_string();
                self.emit_event(match outcome {
                    ProvisionOutcome::Created => EngineEvent::Created { kind, identity },
                    ProvisionOutcome::Updated { changes } => EngineEvent::Updated {
                        kind,
                        identity,
                        changes: *changes,
                    },
                    ProvisionOutcome::Unchanged => EngineEvent::Unchanged { kind, identity },
                    ProvisionOutcome::Adopted => EngineEvent::Adopted { kind, identity },
                });
            }
            Err(e) => self.emit_failure(kind, e),
        }

        result
    }

    /// Ensure the remote resource selected by `selector` no longer exists
    ///
    /// See [`ConvergenceController::dispose`].
    pub async fn dispose(
        &self,
        selector: Selector<'_>,
        kind: &dyn ResourceKind,
    ) -> Result<DisposeOutcome> {
        let result = self.controller().dispose(selector, kind).await;

        match &result {
            Ok(DisposeOutcome::Deleted { identity }) => self.emit_event(EngineEvent::Deleted {
                kind: kind.kind_name().to_string(),
                identity: identity.clone(),
            }),
            Ok(DisposeOutcome::AlreadyAbsent) => self.emit_event(EngineEvent::AlreadyAbsent {
                kind: kind.kind_name().to_string(),
            }),
            Err(e) => self.emit_failure(kind, e),
        }

        result
    }

    /// Poll `resource` until it reaches a status in `spec`
    ///
    /// See [`StatusPoller::wait_for_status`].
    pub async fn wait_for_status(
        &self,
        resource: &mut Resource,
        kind: &dyn ResourceKind,
        spec: &PollSpec,
    ) -> Result<PollOutcome> {
        let poller = StatusPoller::new(&self.executor, &self.config.poller);
        let outcome = poller.wait_for_status(resource, kind, spec).await?;

        if let PollOutcome::Reached { status, .. } = &outcome {
            self.emit_event(EngineEvent::StatusReached {
                kind: kind.kind_name().to_string(),
                identity: resource.identity().unwrap_or_default().to_string(),
                status: status.clone(),
            });
        }

        Ok(outcome)
    }

    /// Drop every cached listing
    pub async fn clear_cache(&self) -> Result<()> {
        match &self.cache {
            Some(cache) => cache.clear().await,
            None => Ok(()),
        }
    }

    /// Persist pending cache changes
    pub async fn flush(&self) -> Result<()> {
        match &self.cache {
            Some(cache) => cache.flush().await,
            None => Ok(()),
        }
    }

    fn controller(&self) -> ConvergenceController<'_> {
        let controller = ConvergenceController::new(&self.executor, &self.config.poller);
        match &self.cache {
            Some(cache) => controller.with_cache(cache.as_ref(), self.config.cache.max_age()),
            None => controller,
        }
    }

    fn emit_failure(&self, kind: &dyn ResourceKind, error: &crate::Error) {
        self.emit_event(EngineEvent::ConvergeFailed {
            kind: kind.kind_name().to_string(),
            error: error.to_string(),
        });
    }

    fn emit_event(&self, event: EngineEvent) {
        debug!("Engine event: {:?}", event);
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Receiver dropped; nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

impl std::fmt::Debug for ConvergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergeEngine")
            .field("executor", &self.executor)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
