//! Plugin-based remote API registry
//!
//! Remote API implementations register a factory under a type name. The
//! engine's callers then build APIs from configuration without hard-coding
//! which implementations exist.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In the converge-http crate
//! pub fn register(registry: &ApiRegistry) {
//!     registry.register("http", Box::new(HttpApiFactory));
//! }
//! ```

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::traits::{RemoteApi, RemoteApiFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of remote API factories
///
/// Uses interior mutability, so registration only needs `&self`.
#[derive(Default)]
pub struct ApiRegistry {
    factories: RwLock<HashMap<String, Box<dyn RemoteApiFactory>>>,
}

impl ApiRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory
    ///
    /// # Parameters
    ///
    /// - `name`: API type name (e.g., "http"); replaces any previous factory
    /// - `factory`: Factory object for creating API instances
    pub fn register(&self, name: impl Into<String>, factory: Box<dyn RemoteApiFactory>) {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        factories.insert(name.into(), factory);
    }

    /// Create a remote API from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(api)`: Created API instance
    /// - `Err(Error)`: Invalid configuration, unknown type, or factory failure
    pub fn create(&self, config: &ApiConfig) -> Result<Arc<dyn RemoteApi>> {
        config.validate()?;

        let api_type = config.type_name();
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);

        let factory = factories
            .get(api_type)
            .ok_or_else(|| Error::config(format!("Unknown API type: {}", api_type)))?;

        factory.create(config)
    }

    /// List all registered API types
    pub fn list(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an API type is registered
    pub fn has(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.contains_key(name)
    }
}

impl std::fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRegistry")
            .field("types", &self.list())
            .finish()
    }
}
