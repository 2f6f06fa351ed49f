// # Memory Resource Cache
//
// In-memory implementation of ResourceCache.
//
// Listings live for the lifetime of the process (or until invalidated or
// aged out). Clones share the same storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Generations;
use crate::Error;
use crate::traits::resource_cache::{CachedListing, ResourceCache};

type Listings = HashMap<String, HashMap<String, CachedListing>>;

#[derive(Debug, Default)]
struct MemoryState {
    listings: Listings,
    generations: Generations,
}

/// In-memory describe cache
///
/// Listings are stored per kind in a HashMap protected by a RwLock.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceCache {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryResourceCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached listings across all kinds
    pub async fn len(&self) -> usize {
        self.inner.read().await.listings.values().map(HashMap::len).sum()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResourceCache for MemoryResourceCache {
    async fn get(&self, kind: &str, key: &str) -> Result<Option<CachedListing>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .listings
            .get(kind)
            .and_then(|listings| listings.get(key))
            .cloned())
    }

    async fn put(&self, kind: &str, key: &str, listing: CachedListing) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard
            .listings
            .entry(kind.to_string())
            .or_default()
            .insert(key.to_string(), listing);
        Ok(())
    }

    async fn put_if_current(
        &self,
        kind: &str,
        key: &str,
        listing: CachedListing,
        generation: u64,
    ) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        if guard.generations.current(kind) != generation {
            return Ok(false);
        }
        guard
            .listings
            .entry(kind.to_string())
            .or_default()
            .insert(key.to_string(), listing);
        Ok(true)
    }

    async fn generation(&self, kind: &str) -> Result<u64, Error> {
        Ok(self.inner.read().await.generations.current(kind))
    }

    async fn invalidate(&self, kind: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.listings.remove(kind);
        guard.generations.bump(kind);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.listings.clear();
        guard.generations.bump_all();
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }
}
