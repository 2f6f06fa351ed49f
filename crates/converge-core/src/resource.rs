//! Resource model shared by the controller and the poller
//!
//! A [`Resource`] is owned by the caller. The engine fills in identity,
//! status and observed attributes as it describes, creates and updates the
//! remote object, but never drops or replaces the caller's value.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute set of a resource (desired or observed)
pub type Attributes = Map<String, Value>;

/// The caller's model of one remote-managed object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Remote identity, assigned once the object exists
    identity: Option<String>,

    /// Last observed status (meaningful only within a resource kind)
    status: Option<String>,

    /// Attributes the caller wants the remote object to have
    pub desired: Attributes,

    /// Attributes from the last describe call
    observed: Attributes,
}

impl Resource {
    /// Create a resource from desired attributes only
    pub fn new(desired: Attributes) -> Self {
        Self {
            desired,
            ..Self::default()
        }
    }

    /// Create a resource mirroring an observation
    pub fn from_observation(observation: &Observation) -> Self {
        Self {
            identity: Some(observation.identity.clone()),
            status: Some(observation.status.clone()),
            desired: Attributes::new(),
            observed: observation.attributes.clone(),
        }
    }

    /// Remote identity, if assigned
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Last observed status
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Attributes from the last describe call
    pub fn observed(&self) -> &Attributes {
        &self.observed
    }

    /// Desired attribute as a string, if present and a string
    pub fn desired_str(&self, key: &str) -> Option<&str> {
        self.desired.get(key).and_then(Value::as_str)
    }

    /// Record an observation of the remote object
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityChanged`] if the resource already has an
    /// identity and the observation reports a different one. The resource
    /// is left untouched in that case.
    pub fn apply(&mut self, observation: &Observation) -> Result<()> {
        if let Some(current) = &self.identity {
            if *current != observation.identity {
                return Err(Error::IdentityChanged {
                    current: current.clone(),
                    observed: observation.identity.clone(),
                });
            }
        }

        self.identity = Some(observation.identity.clone());
        self.status = Some(observation.status.clone());
        self.observed = observation.attributes.clone();
        Ok(())
    }

    /// Drop the identity, status and observed attributes
    ///
    /// Used when the remote object behind the identity no longer exists, so
    /// the resource can be matched and created afresh.
    pub fn forget_identity(&mut self) {
        self.identity = None;
        self.status = None;
        self.observed.clear();
    }

    /// Check the resource invariants
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_some() && self.status.is_none() {
            return Err(Error::invalid_resource(
                "resource has an identity but no status",
            ));
        }
        Ok(())
    }
}

/// One remote object as mapped by a resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Remote identity
    pub identity: String,
    /// Remote status
    pub status: String,
    /// Mapped attributes
    pub attributes: Attributes,
}

impl Observation {
    /// Status reported by kinds without a lifecycle
    pub const PRESENT: &'static str = "present";

    /// Create an observation
    pub fn new(
        identity: impl Into<String>,
        status: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            identity: identity.into(),
            status: status.into(),
            attributes,
        }
    }
}

/// How a lookup picks its resource out of a describe listing
#[derive(Debug, Clone, Copy)]
pub enum Selector<'a> {
    /// Exact identity match
    Identity(&'a str),
    /// Identity if the resource has one, the kind's predicate otherwise
    Desired(&'a Resource),
}

impl<'a> Selector<'a> {
    /// The identity this selector pins, if any
    pub fn identity(&self) -> Option<&'a str> {
        match self {
            Selector::Identity(identity) => Some(identity),
            Selector::Desired(resource) => resource.identity(),
        }
    }

    /// The desired resource behind this selector, if any
    pub fn resource(&self) -> Option<&'a Resource> {
        match self {
            Selector::Identity(_) => None,
            Selector::Desired(resource) => Some(resource),
        }
    }
}

impl<'a> From<&'a Resource> for Selector<'a> {
    fn from(resource: &'a Resource) -> Self {
        Selector::Desired(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_apply_assigns_identity_and_status() {
        let mut resource = Resource::new(attrs(json!({"name": "jobs"})));
        let observation = Observation::new("q-1", "CREATING", attrs(json!({"name": "jobs"})));

        resource.apply(&observation).unwrap();

        assert_eq!(resource.identity(), Some("q-1"));
        assert_eq!(resource.status(), Some("CREATING"));
        assert_eq!(resource.observed().get("name"), Some(&json!("jobs")));
        assert_eq!(resource.desired_str("name"), Some("jobs"));
        assert!(resource.validate().is_ok());
    }

    #[test]
    fn test_identity_is_immutable() {
        let mut resource = Resource::new(Attributes::new());
        resource
            .apply(&Observation::new("q-1", "AVAILABLE", Attributes::new()))
            .unwrap();

        let result = resource.apply(&Observation::new("q-2", "AVAILABLE", Attributes::new()));

        assert!(matches!(result, Err(Error::IdentityChanged { .. })));
        assert_eq!(resource.identity(), Some("q-1"));
    }

    #[test]
    fn test_forget_identity_allows_a_new_identity() {
        let mut resource = Resource::new(attrs(json!({"Name": "orders"})));
        resource
            .apply(&Observation::new("q-1", "ACTIVE", attrs(json!({"Name": "orders"}))))
            .unwrap();

        resource.forget_identity();

        assert_eq!(resource.identity(), None);
        assert_eq!(resource.status(), None);
        assert!(resource.observed().is_empty());
        assert_eq!(resource.desired_str("Name"), Some("orders"));
        resource
            .apply(&Observation::new("q-2", "ACTIVE", Attributes::new()))
            .unwrap();
        assert_eq!(resource.identity(), Some("q-2"));
    }

    #[test]
    fn test_identity_without_status_is_invalid() {
        let resource: Resource =
            serde_json::from_value(json!({"identity": "q-1", "status": null, "desired": {}, "observed": {}}))
                .unwrap();

        assert!(matches!(resource.validate(), Err(Error::InvalidResource(_))));
    }

    #[test]
    fn test_selector_prefers_identity() {
        let mut resource = Resource::new(Attributes::new());
        assert_eq!(Selector::from(&resource).identity(), None);

        resource
            .apply(&Observation::new("q-9", Observation::PRESENT, Attributes::new()))
            .unwrap();
        assert_eq!(Selector::from(&resource).identity(), Some("q-9"));
        assert_eq!(Selector::Identity("q-3").identity(), Some("q-3"));
    }
}
