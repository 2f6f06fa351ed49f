// # Resource Cache Trait
//
// Memoizes describe listings so repeated convergence runs do not list the
// same resource kind over and over.
//
// ## Invalidation
//
// The controller invalidates a kind after every mutating call on it.
// Listings also age out after the configured maximum age. Status polls and
// post-mutation refreshes always bypass the cache.
//
// Every invalidation (and `clear`) advances the kind's generation. A listing
// fetched remotely is stored with `put_if_current` under the generation read
// before the fetch, so a listing that raced an invalidation is discarded.
//
// ## Implementations
//
// - Memory: `cache::MemoryResourceCache`
// - File: `cache::FileResourceCache` (shared across runs)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached describe listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedListing {
    /// Raw listing items
    pub items: Vec<Value>,
    /// When the listing was fetched
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

impl CachedListing {
    /// Wrap freshly fetched items
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            fetched_at: chrono::Utc::now(),
        }
    }

    /// Check if the listing is older than `max_age`
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        let now = chrono::Utc::now();
        now.signed_duration_since(self.fetched_at) > max_age
    }
}

/// Trait for describe-result caches
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from several engine calls.
///
/// # Keys
///
/// Entries are grouped by resource kind so a mutation can drop every listing
/// of that kind at once. The key within a kind identifies the describe
/// request (method and parameters).
#[async_trait]
pub trait ResourceCache: Send + Sync {
    /// Get a cached listing
    ///
    /// # Returns
    ///
    /// - `Ok(Some(CachedListing))`: The cached listing (possibly stale)
    /// - `Ok(None)`: Nothing cached
    /// - `Err(Error)`: Storage error
    async fn get(&self, kind: &str, key: &str) -> Result<Option<CachedListing>, crate::Error>;

    /// Store a listing
    async fn put(&self, kind: &str, key: &str, listing: CachedListing)
    -> Result<(), crate::Error>;

    /// Store a listing unless `kind` was invalidated after `generation`
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The listing was stored
    /// - `Ok(false)`: The kind's generation moved on; nothing was stored
    async fn put_if_current(
        &self,
        kind: &str,
        key: &str,
        listing: CachedListing,
        generation: u64,
    ) -> Result<bool, crate::Error>;

    /// Invalidation generation of `kind`
    async fn generation(&self, kind: &str) -> Result<u64, crate::Error>;

    /// Drop every listing of `kind`
    async fn invalidate(&self, kind: &str) -> Result<(), crate::Error>;

    /// Drop every listing
    async fn clear(&self) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
