// # File Resource Cache
//
// File-backed implementation of ResourceCache, shared across runs of the
// same tool.
//
// ## Durability
//
// - Atomic writes: the new cache is written to a `.tmp` file, then renamed
// - Backup: the previous cache file is kept as `.backup`
// - Corruption: an unparsable file falls back to the backup, then to empty
//
// Losing the cache is harmless; it only costs extra describe calls.
// Invalidation generations live in memory only and restart with the process.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "kinds": {
//     "queue": {
//       "list_queues:{}": {
//         "items": [ ... ],
//         "fetched_at": "2025-01-09T12:00:00Z"
//       }
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::Generations;
use crate::Error;
use crate::traits::resource_cache::{CachedListing, ResourceCache};

/// Cache file format version
const CACHE_FILE_VERSION: &str = "1.0";

type Listings = HashMap<String, HashMap<String, CachedListing>>;

/// File-backed describe cache
///
/// Every mutation is written through to disk immediately.
#[derive(Debug)]
pub struct FileResourceCache {
    path: PathBuf,
    state: Arc<RwLock<CacheState>>,
}

#[derive(Debug)]
struct CacheState {
    kinds: Listings,
    generations: Generations,
    dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CacheFileFormat {
    version: String,
    kinds: Listings,
}

impl FileResourceCache {
    /// Create or load a file cache
    ///
    /// Creates parent directories as needed. A corrupted file is recovered
    /// from its backup, or replaced by an empty cache.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create cache directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let kinds = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(CacheState {
                kinds,
                generations: Generations::default(),
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Listings, Error> {
        match Self::load(path).await {
            Ok(kinds) => {
                tracing::debug!("Loaded resource cache: {} kinds", kinds.len());
                Ok(kinds)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Resource cache {} is corrupted: {}. Trying backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No cache backup found. Starting empty.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(kinds) => {
                        tracing::info!("Recovered resource cache from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore cache file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(kinds)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Cache backup also unusable: {}. Starting empty.",
                            backup_err
                        );
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Listings, Error> {
        if !path.exists() {
            tracing::debug!("Cache file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::cache(format!("Failed to read cache file {}: {}", path.display(), e))
        })?;

        let file: CacheFileFormat = serde_json::from_str(&content)?;

        if file.version != CACHE_FILE_VERSION {
            tracing::warn!(
                "Cache file version mismatch: expected {}, got {}. Loading anyway.",
                CACHE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.kinds)
    }

    async fn write(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;

        let file = CacheFileFormat {
            version: CACHE_FILE_VERSION.to_string(),
            kinds: guard.kinds.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await?;
            out.flush().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to back up resource cache: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::cache(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        guard.dirty = false;
        tracing::trace!("Resource cache written: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    async fn mutate<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Listings) + Send,
    {
        {
            let mut guard = self.state.write().await;
            change(&mut guard.kinds);
            guard.dirty = true;
        }
        self.write().await
    }
}

#[async_trait]
impl ResourceCache for FileResourceCache {
    async fn get(&self, kind: &str, key: &str) -> Result<Option<CachedListing>, Error> {
        let guard = self.state.read().await;
        Ok(guard.kinds.get(kind).and_then(|listings| listings.get(key)).cloned())
    }

    async fn put(&self, kind: &str, key: &str, listing: CachedListing) -> Result<(), Error> {
        self.mutate(|kinds| {
            kinds
                .entry(kind.to_string())
                .or_default()
                .insert(key.to_string(), listing);
        })
        .await
    }

    async fn put_if_current(
        &self,
        kind: &str,
        key: &str,
        listing: CachedListing,
        generation: u64,
    ) -> Result<bool, Error> {
        {
            let mut guard = self.state.write().await;
            if guard.generations.current(kind) != generation {
                return Ok(false);
            }
            guard
                .kinds
                .entry(kind.to_string())
                .or_default()
                .insert(key.to_string(), listing);
            guard.dirty = true;
        }
        self.write().await?;
        Ok(true)
    }

    async fn generation(&self, kind: &str) -> Result<u64, Error> {
        Ok(self.state.read().await.generations.current(kind))
    }

    async fn invalidate(&self, kind: &str) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard.generations.bump(kind);
            if !guard.kinds.contains_key(kind) {
                return Ok(());
            }
        }
        self.mutate(|kinds| {
            kinds.remove(kind);
        })
        .await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.state.write().await.generations.bump_all();
        self.mutate(HashMap::clear).await
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write().await } else { Ok(()) }
    }
}
