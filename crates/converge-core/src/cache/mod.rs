// # Resource Cache Implementations
//
// This module provides implementations of the ResourceCache trait and the
// helper that builds one from configuration.

pub mod file;
pub mod memory;

pub use file::FileResourceCache;
pub use memory::MemoryResourceCache;

use crate::config::{CacheBackend, CacheConfig};
use crate::error::Result;
use crate::traits::ResourceCache;
use std::collections::HashMap;
use std::sync::Arc;

/// Invalidation counters shared by the cache implementations
///
/// A kind's generation is the clear epoch plus its own invalidation count,
/// so it only ever grows.
#[derive(Debug, Default)]
pub(crate) struct Generations {
    epoch: u64,
    kinds: HashMap<String, u64>,
}

impl Generations {
    pub(crate) fn current(&self, kind: &str) -> u64 {
        self.epoch + self.kinds.get(kind).copied().unwrap_or(0)
    }

    pub(crate) fn bump(&mut self, kind: &str) {
        *self.kinds.entry(kind.to_string()).or_default() += 1;
    }

    pub(crate) fn bump_all(&mut self) {
        self.epoch += 1;
    }
}

/// Open the cache described by `config`
///
/// # Returns
///
/// - `Ok(None)`: Caching is disabled
/// - `Ok(Some(cache))`: The opened cache
/// - `Err(Error)`: The file cache could not be created
pub async fn open(config: &CacheConfig) -> Result<Option<Arc<dyn ResourceCache>>> {
    config.validate()?;

    let cache: Arc<dyn ResourceCache> = match &config.backend {
        CacheBackend::Disabled => return Ok(None),
        CacheBackend::Memory => Arc::new(MemoryResourceCache::new()),
        CacheBackend::File { path } => Arc::new(FileResourceCache::new(path).await?),
    };

    Ok(Some(cache))
}
