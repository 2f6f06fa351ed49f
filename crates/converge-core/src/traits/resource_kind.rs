// # Resource Kind Trait
//
// A resource kind binds the engine to one family of remote objects: how to
// list them, how to map a raw item onto an observation, how to recognize the
// caller's object, and which requests create, update or delete it.
//
// Kinds are pure request builders. They never perform I/O; every request
// they build is issued by the executor.

use crate::error::{Error, Result};
use crate::executor::OperationRequest;
use crate::poller::PollSpec;
use crate::resource::{Observation, Resource, Selector};
use crate::traits::ApiError;
use serde_json::Value;

/// Trait for resource kind bindings
///
/// # Thread Safety
///
/// Kinds are shared by reference across engine calls and must be
/// `Send + Sync`.
pub trait ResourceKind: Send + Sync {
    /// Kind name (used for cache keys, logging and errors)
    fn kind_name(&self) -> &str;

    /// Build the describe/list request
    ///
    /// The request may narrow the listing server-side using the selector.
    /// The engine still filters the result client-side.
    fn describe(&self, selector: &Selector<'_>) -> OperationRequest;

    /// Map one raw listing item onto an observation
    fn observe(&self, item: &Value) -> Result<Observation>;

    /// Map the first item of a create response onto an observation
    ///
    /// Returns `None` if the create response does not describe the object;
    /// the controller then re-describes it. The default uses [`observe`].
    ///
    /// [`observe`]: ResourceKind::observe
    fn observe_created(&self, item: &Value) -> Option<Observation> {
        self.observe(item).ok()
    }

    /// Whether `observed` is the remote counterpart of `desired`
    ///
    /// Used only while `desired` has no identity (e.g. a name or tag match).
    fn matches(&self, desired: &Resource, observed: &Observation) -> bool;

    /// Build the create request for `desired`
    fn create(&self, desired: &Resource) -> Result<OperationRequest>;

    /// Build the update requests that bring `current` to `desired`
    ///
    /// An empty list means the remote object already matches.
    fn diff(&self, current: &Observation, desired: &Resource) -> Result<Vec<OperationRequest>>;

    /// Build the delete request for `current`
    fn delete(&self, current: &Observation) -> Result<OperationRequest>;

    /// Whether a delete error means the object is already gone
    fn ignore_delete_error(&self, _error: &ApiError) -> bool {
        false
    }

    /// Status to wait for after create/update
    fn ready_poll(&self) -> Option<PollSpec> {
        None
    }

    /// Status to wait for after delete
    ///
    /// Absence from the listing always counts as deleted.
    fn deletion_poll(&self) -> Option<PollSpec> {
        None
    }
}

/// Pick at most one observation matching `selector` out of `items`
///
/// # Errors
///
/// Returns [`Error::AmbiguousState`] if more than one item matches.
pub(crate) fn select(
    kind: &dyn ResourceKind,
    selector: &Selector<'_>,
    items: &[Value],
) -> Result<Option<Observation>> {
    let mut matched = Vec::new();

    for item in items {
        let observation = kind.observe(item)?;
        let admitted = match selector.identity() {
            Some(identity) => observation.identity == identity,
            None => selector
                .resource()
                .is_some_and(|desired| kind.matches(desired, &observation)),
        };
        if admitted {
            matched.push(observation);
        }
    }

    if matched.len() > 1 {
        return Err(Error::AmbiguousState {
            kind: kind.kind_name().to_string(),
            identities: matched.into_iter().map(|o| o.identity).collect(),
        });
    }

    Ok(matched.pop())
}
