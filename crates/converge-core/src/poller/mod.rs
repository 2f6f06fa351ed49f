// # Status Poller
//
// Waits for an asynchronous server-side status transition.
//
// ## State Machine
//
// ```text
//            ┌──────── status ∈ desired ────────► success
//            │
// polling ───┼──────── status ∈ error, or ──────► error (RemoteErrorStatus)
//    ▲       │         permitted ≠ ∅ and status ∉ permitted ∪ desired
//    │       │
//    │       ├──────── missing and until_gone ──► gone
//    │       │
//    │       └──────── elapsed ≥ timeout ───────► timeout (PollTimeout)
//    │                                    │
//    └──── sleep(min(interval, remaining)) ◄┘ otherwise
// ```
//
// Each tick re-describes the resource through the executor, never through the
// cache. No tick is issued once the deadline has passed. A resource missing
// from the listing without `until_gone` has an undefined status and keeps
// polling.

use crate::config::PollerConfig;
use crate::error::{Error, Result};
use crate::executor::RequestExecutor;
use crate::resource::{Resource, Selector};
use crate::traits::ResourceKind;
use crate::traits::resource_kind::select;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// What a status poll waits for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSpec {
    /// Statuses that end the poll successfully
    pub desired: BTreeSet<String>,
    /// Statuses allowed while waiting (empty: any non-error status)
    pub permitted: BTreeSet<String>,
    /// Statuses that fail the poll
    pub error: BTreeSet<String>,
    /// Timeout (poller default when unset)
    pub timeout: Option<Duration>,
    /// Interval between polls (poller default when unset)
    pub interval: Option<Duration>,
    /// Absence from the listing counts as success
    pub until_gone: bool,
}

impl PollSpec {
    /// Wait until the status is one of `desired`
    pub fn until<I, S>(desired: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            desired: desired.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Restrict the statuses allowed while waiting
    pub fn permitting<I, S>(mut self, permitted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted = permitted.into_iter().map(Into::into).collect();
        self
    }

    /// Fail on any of these statuses
    pub fn failing_on<I, S>(mut self, error: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error = error.into_iter().map(Into::into).collect();
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the interval between polls
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Treat absence from the listing as success
    pub fn or_gone(mut self) -> Self {
        self.until_gone = true;
        self
    }

    /// Whether `status` ends the poll successfully
    pub fn is_desired(&self, status: &str) -> bool {
        self.desired.contains(status)
    }

    /// Whether `status` fails the poll
    pub fn is_error(&self, status: &str) -> bool {
        self.error.contains(status)
            || (!self.permitted.is_empty()
                && !self.permitted.contains(status)
                && !self.desired.contains(status))
    }
}

/// How a status poll ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A desired status was observed
    Reached {
        /// Status observed
        status: String,
        /// Describe calls made
        polls: u32,
    },
    /// The resource disappeared from the listing
    Gone {
        /// Describe calls made
        polls: u32,
    },
}

/// Bounded status polling loop
pub struct StatusPoller<'a> {
    executor: &'a RequestExecutor,
    defaults: &'a PollerConfig,
}

impl<'a> StatusPoller<'a> {
    /// Create a poller using `defaults` for unset timeouts and intervals
    pub fn new(executor: &'a RequestExecutor, defaults: &'a PollerConfig) -> Self {
        Self { executor, defaults }
    }

    /// Poll until `resource` reaches a status in `spec`
    ///
    /// `resource` must have an identity. Its status and observed attributes
    /// are refreshed on every tick.
    ///
    /// # Errors
    ///
    /// - [`Error::RemoteErrorStatus`]: an error or non-permitted status
    /// - [`Error::PollTimeout`]: the timeout elapsed first
    /// - [`Error::Cancelled`]: the executor's token fired
    /// - Any executor error from the describe call
    pub async fn wait_for_status(
        &self,
        resource: &mut Resource,
        kind: &dyn ResourceKind,
        spec: &PollSpec,
    ) -> Result<PollOutcome> {
        resource.validate()?;
        let identity = resource
            .identity()
            .map(str::to_string)
            .ok_or_else(|| Error::invalid_resource("cannot poll a resource without identity"))?;

        let timeout = spec.timeout.unwrap_or_else(|| self.defaults.timeout());
        let interval = spec.interval.unwrap_or_else(|| self.defaults.interval());
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let selector = Selector::Identity(&identity);
            let listing = self.executor.collect(kind.describe(&selector)).await?;

            match select(kind, &selector, &listing)? {
                Some(observation) => {
                    resource.apply(&observation)?;
                    let status = observation.status;

                    if spec.is_desired(&status) {
                        info!("{} reached {} after {} polls", identity, status, polls);
                        return Ok(PollOutcome::Reached { status, polls });
                    }

                    if spec.is_error(&status) {
                        error!("{} entered error status {}", identity, status);
                        return Err(Error::RemoteErrorStatus {
                            identity,
                            status,
                            expected: spec.desired.iter().cloned().collect(),
                        });
                    }
                }
                None if spec.until_gone => {
                    info!("{} is gone after {} polls", identity, polls);
                    return Ok(PollOutcome::Gone { polls });
                }
                None => {
                    debug!("{} not visible yet, status undefined", identity);
                }
            }

            let elapsed = started.elapsed();
            let remaining = timeout.saturating_sub(elapsed);
            if remaining.is_zero() {
                return Err(timed_out(identity, spec, resource, timeout));
            }

            info!(
                "Waiting for {} ({:?}/{:?}, status: {})",
                identity,
                elapsed,
                timeout,
                resource.status().unwrap_or("<undefined>")
            );

            let cancel = self.executor.cancellation_token();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled {
                        operation: format!("wait_for_status {}", identity),
                    });
                }
                _ = tokio::time::sleep(interval.min(remaining)) => {}
            }

            // The deadline may fall inside the sleep; never tick past it
            if started.elapsed() >= timeout {
                return Err(timed_out(identity, spec, resource, timeout));
            }
        }
    }
}

fn timed_out(identity: String, spec: &PollSpec, resource: &Resource, timeout: Duration) -> Error {
    error!("Timed out after {:?} waiting for {}", timeout, identity);
    Error::PollTimeout {
        identity,
        desired: spec.desired.iter().cloned().collect(),
        last_status: resource.status().map(str::to_string),
        timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PollSpec {
        PollSpec::until(["AVAILABLE"])
            .permitting(["CREATING", "AVAILABLE"])
            .failing_on(["FAILED"])
    }

    #[test]
    fn test_desired_status() {
        let spec = spec();
        assert!(spec.is_desired("AVAILABLE"));
        assert!(!spec.is_error("AVAILABLE"));
    }

    #[test]
    fn test_error_and_unpermitted_statuses() {
        let spec = spec();
        assert!(spec.is_error("FAILED"));
        assert!(spec.is_error("DELETING"));
        assert!(!spec.is_error("CREATING"));
    }

    #[test]
    fn test_empty_permitted_allows_any_non_error() {
        let spec = PollSpec::until(["ACTIVE"]).failing_on(["FAILED"]);
        assert!(!spec.is_error("ANYTHING"));
        assert!(spec.is_error("FAILED"));
    }
}
