//! Convergence controller
//!
//! Drives one resource toward its desired state:
//!
//! 1. Describe the current resources of the kind (cache first)
//! 2. Pick the caller's resource by identity or predicate
//! 3. More than one match: fail before any mutating call
//! 4. None: create, then observe the created object
//! 5. One: diff, and update only if the diff is non-empty
//! 6. Optionally wait for a ready status
//!
//! Disposal is the mirror image: describe, delete if present, optionally wait
//! until deleted or gone.
//!
//! ## Concurrency
//!
//! "Create at most once" is a describe-before-create discipline only. Two
//! processes converging the same resource at the same time may both see it
//! absent and both create it. Callers needing mutual exclusion across
//! processes must lock externally.

use crate::config::PollerConfig;
use crate::error::{Error, Result};
use crate::executor::{OperationRequest, RequestExecutor};
use crate::poller::{PollSpec, StatusPoller};
use crate::resource::{Observation, Resource, Selector};
use crate::traits::resource_kind::select;
use crate::traits::{CachedListing, ResourceCache, ResourceKind};
use serde_json::Value;
use tracing::{debug, info, warn};

/// How `provision` treats an existing resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProvisionMode {
    /// Update the existing resource until it matches
    #[default]
    Declarative,
    /// Take the existing resource as-is
    Adopt,
}

/// Result of a `provision` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// No resource existed; one was created
    Created,
    /// The resource existed and was updated
    Updated {
        /// Update requests issued
        changes: usize,
    },
    /// The resource already matched
    Unchanged,
    /// The resource existed and was adopted without diffing
    Adopted,
}

impl ProvisionOutcome {
    /// Whether any mutating call was issued
    pub fn mutated(&self) -> bool {
        matches!(self, Self::Created | Self::Updated { .. })
    }
}

/// Result of a `dispose` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// Nothing matched; no call was made
    AlreadyAbsent,
    /// The resource was deleted
    Deleted {
        /// Identity of the deleted resource
        identity: String,
    },
}

impl DisposeOutcome {
    /// Whether a delete call was issued
    pub fn deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// Create/update/delete orchestration for single resources
pub struct ConvergenceController<'a> {
    executor: &'a RequestExecutor,
    poller: StatusPoller<'a>,
    cache: Option<&'a dyn ResourceCache>,
    cache_max_age: chrono::Duration,
}

impl<'a> ConvergenceController<'a> {
    /// Create a controller without a cache
    pub fn new(executor: &'a RequestExecutor, poller_defaults: &'a PollerConfig) -> Self {
        Self {
            executor,
            poller: StatusPoller::new(executor, poller_defaults),
            cache: None,
            cache_max_age: chrono::Duration::zero(),
        }
    }

    /// Serve describe listings from `cache` while younger than `max_age`
    pub fn with_cache(mut self, cache: &'a dyn ResourceCache, max_age: chrono::Duration) -> Self {
        self.cache = Some(cache);
        self.cache_max_age = max_age;
        self
    }

    /// Ensure the remote resource matches `desired`
    ///
    /// `desired` is updated in place with the identity, status and observed
    /// attributes of the remote object. If `desired` carries an identity that
    /// the remote API no longer lists, the identity is dropped and the kind's
    /// predicate decides whether to create.
    ///
    /// # Parameters
    ///
    /// - `desired`: The caller's resource
    /// - `kind`: Resource kind binding
    /// - `mode`: Update existing resources, or adopt them as-is
    ///
    /// # Errors
    ///
    /// - [`Error::AmbiguousState`]: more than one match; nothing was mutated
    /// - Any executor or poller error
    pub async fn provision(
        &self,
        desired: &mut Resource,
        kind: &dyn ResourceKind,
        mode: ProvisionMode,
    ) -> Result<ProvisionOutcome> {
        desired.validate()?;

        let mut current = self.lookup(kind, &Selector::from(&*desired), true).await?;
        if current.is_none() {
            if let Some(stale) = desired.identity().map(str::to_string) {
                warn!(
                    "{} {} no longer exists, matching by attributes instead",
                    kind.kind_name(),
                    stale
                );
                desired.forget_identity();
                current = self.lookup(kind, &Selector::from(&*desired), false).await?;
            }
        }

        let outcome = match current {
            None => {
                self.create(desired, kind).await?;
                ProvisionOutcome::Created
            }
            Some(observation) => {
                desired.apply(&observation)?;
                match mode {
                    ProvisionMode::Adopt => {
                        debug!("Adopting existing {} {}", kind.kind_name(), observation.identity);
                        ProvisionOutcome::Adopted
                    }
                    ProvisionMode::Declarative => self.update(desired, kind, &observation).await?,
                }
            }
        };

        if let Some(spec) = kind.ready_poll() {
            self.wait_ready(desired, kind, &spec).await?;
        }

        Ok(outcome)
    }

    /// Ensure the remote resource selected by `selector` no longer exists
    ///
    /// Always lists the remote API; the cache is not trusted for absence.
    pub async fn dispose(
        &self,
        selector: Selector<'_>,
        kind: &dyn ResourceKind,
    ) -> Result<DisposeOutcome> {
        let Some(current) = self.lookup(kind, &selector, false).await? else {
            info!("{} already absent, nothing to delete", kind.kind_name());
            return Ok(DisposeOutcome::AlreadyAbsent);
        };

        let op = kind.delete(&current)?;
        info!("Deleting {} {} via {}", kind.kind_name(), current.identity, op.method);
        let deleted = self
            .executor
            .execute_ignoring(op, |err| kind.ignore_delete_error(err))
            .try_collect()
            .await;
        self.invalidate(kind).await;
        deleted?;

        if let Some(spec) = kind.deletion_poll() {
            let mut tracked = Resource::from_observation(&current);
            self.poller
                .wait_for_status(&mut tracked, kind, &spec.or_gone())
                .await?;
        }

        Ok(DisposeOutcome::Deleted {
            identity: current.identity,
        })
    }

    /// Find the single resource selected by `selector`
    ///
    /// # Returns
    ///
    /// - `Ok(None)`: Nothing matched
    /// - `Ok(Some(observation))`: Exactly one match
    /// - `Err(Error::AmbiguousState)`: Several matches
    pub async fn lookup(
        &self,
        kind: &dyn ResourceKind,
        selector: &Selector<'_>,
        use_cache: bool,
    ) -> Result<Option<Observation>> {
        let op = kind.describe(selector);
        let items = if use_cache {
            self.cached_listing(kind, op).await?
        } else {
            self.executor.collect(op).await?
        };
        select(kind, selector, &items)
    }

    async fn create(&self, desired: &mut Resource, kind: &dyn ResourceKind) -> Result<()> {
        let op = kind.create(desired)?;
        info!("Creating {} via {}", kind.kind_name(), op.method);

        let response = self.executor.collect(op).await;
        self.invalidate(kind).await;
        let response = response?;

        let observation = match response.first().and_then(|item| kind.observe_created(item)) {
            Some(observation) => observation,
            None => self.refresh(desired, kind).await?,
        };
        desired.apply(&observation)?;

        info!("Created {} {}", kind.kind_name(), observation.identity);
        Ok(())
    }

    async fn update(
        &self,
        desired: &mut Resource,
        kind: &dyn ResourceKind,
        current: &Observation,
    ) -> Result<ProvisionOutcome> {
        let changes = kind.diff(current, desired)?;
        if changes.is_empty() {
            debug!("{} {} already converged", kind.kind_name(), current.identity);
            return Ok(ProvisionOutcome::Unchanged);
        }

        let count = changes.len();
        for op in changes {
            info!("Updating {} {} via {}", kind.kind_name(), current.identity, op.method);
            let result = self.executor.collect(op).await;
            self.invalidate(kind).await;
            result?;
        }

        let observation = self.refresh(desired, kind).await?;
        desired.apply(&observation)?;

        Ok(ProvisionOutcome::Updated { changes: count })
    }

    /// Re-describe `desired` from the remote API, bypassing the cache
    async fn refresh(&self, desired: &Resource, kind: &dyn ResourceKind) -> Result<Observation> {
        let selector = Selector::from(desired);
        let op = kind.describe(&selector);
        let method = op.method.clone();

        self.lookup(kind, &selector, false)
            .await?
            .ok_or(Error::NoValues(method))
    }

    async fn wait_ready(
        &self,
        desired: &mut Resource,
        kind: &dyn ResourceKind,
        spec: &PollSpec,
    ) -> Result<()> {
        if desired.status().is_some_and(|status| spec.is_desired(status)) {
            return Ok(());
        }
        self.poller.wait_for_status(desired, kind, spec).await?;
        Ok(())
    }

    async fn cached_listing(&self, kind: &dyn ResourceKind, op: OperationRequest) -> Result<Vec<Value>> {
        let Some(cache) = self.cache else {
            return self.executor.collect(op).await;
        };

        let key = cache_key(&op);
        let generation = match cache.generation(kind.kind_name()).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!("Resource cache unavailable, listing remotely: {}", e);
                None
            }
        };
        match cache.get(kind.kind_name(), &key).await {
            Ok(Some(listing)) if !listing.is_stale(self.cache_max_age) => {
                debug!("Cache hit for {} ({})", kind.kind_name(), key);
                return Ok(listing.items);
            }
            Ok(_) => {}
            Err(e) => warn!("Resource cache read failed, listing remotely: {}", e),
        }

        let items = self.executor.collect(op).await?;
        let Some(generation) = generation else {
            return Ok(items);
        };
        match cache
            .put_if_current(kind.kind_name(), &key, CachedListing::new(items.clone()), generation)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!("{} invalidated while listing, not caching", kind.kind_name()),
            Err(e) => warn!("Resource cache write failed: {}", e),
        }
        Ok(items)
    }

    /// Drop cached listings of `kind` after a mutating call, failed or not
    ///
    /// A failed call may still have changed the remote side. Cache failures
    /// are logged.
    async fn invalidate(&self, kind: &dyn ResourceKind) {
        if let Some(cache) = self.cache {
            if let Err(e) = cache.invalidate(kind.kind_name()).await {
                warn!("Failed to invalidate cached {} listings: {}", kind.kind_name(), e);
            }
        }
    }
}

/// Cache key for a describe request within its kind
pub(crate) fn cache_key(op: &OperationRequest) -> String {
    format!("{}:{}", op.method, op.params_json())
}
