//! Age- and count-bounded durable image store.
//!
//! Wraps a [`DurableBackend`] and turns every backend failure into a logged
//! cache miss. Full images and thumbnails share the backend but are
//! partitioned by key prefix, with a separate cap per namespace.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheEntry, EncodedImage, Namespace, SourceId};
use crate::domain::errors::StoreResult;
use crate::domain::ports::{DurableBackend, StoredRecord};

/// Default max age of a durable entry.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

/// Default cap of the full-size namespace.
pub const DEFAULT_FULL_CAPACITY: usize = 200;

/// Default cap of the thumbnail namespace.
pub const DEFAULT_THUMBNAIL_CAPACITY: usize = 1000;

/// Extra entries removed by each eviction pass.
pub const DEFAULT_EVICTION_MARGIN: usize = 20;

/// Limits applied by [`DurableStore`].
#[derive(Debug, Clone)]
pub struct DurableStoreConfig {
    pub max_age: TimeDelta,
    pub full_capacity: usize,
    pub thumbnail_capacity: usize,
    pub eviction_margin: usize,
}

impl Default for DurableStoreConfig {
    fn default() -> Self {
        Self {
            max_age: TimeDelta::days(DEFAULT_MAX_AGE_DAYS),
            full_capacity: DEFAULT_FULL_CAPACITY,
            thumbnail_capacity: DEFAULT_THUMBNAIL_CAPACITY,
            eviction_margin: DEFAULT_EVICTION_MARGIN,
        }
    }
}

impl DurableStoreConfig {
    #[must_use]
    pub const fn capacity(&self, namespace: Namespace) -> usize {
        match namespace {
            Namespace::Full => self.full_capacity,
            Namespace::Thumbnail => self.thumbnail_capacity,
        }
    }
}

/// Durable cache tier. An optimization, never a source of truth.
pub struct DurableStore {
    backend: Arc<dyn DurableBackend>,
    config: DurableStoreConfig,
    /// Held for a whole eviction pass so each pass sees the previous one's deletions.
    eviction: Mutex<()>,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DurableStore {
    #[must_use]
    pub fn new(backend: Arc<dyn DurableBackend>, config: DurableStoreConfig) -> Self {
        Self {
            backend,
            config,
            eviction: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DurableStoreConfig {
        &self.config
    }

    /// Returns the payload if present and younger than the max age.
    ///
    /// Expired entries are reported absent but left in place until the next
    /// eviction or prune pass.
    pub async fn get(&self, namespace: Namespace, source: &SourceId) -> Option<EncodedImage> {
        let key = namespace.key(source);
        let record = match self.backend.get(&key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                trace!(key = %key, "Durable store miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Durable store read failed, treating as miss");
                return None;
            }
        };

        let entry = match record.into_entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable durable entry");
                return None;
            }
        };

        if entry.is_expired(Utc::now(), self.config.max_age) {
            debug!(key = %key, stored_at = %entry.stored_at, "Durable entry expired");
            return None;
        }

        trace!(key = %key, "Durable store hit");
        Some(entry.payload)
    }

    /// Upserts a payload with a fresh timestamp, then runs a batched eviction
    /// pass if the namespace is over its cap.
    ///
    /// Passes of concurrent puts run one at a time and each recounts, so a
    /// namespace never drops below `cap - eviction_margin` through eviction.
    pub async fn put(&self, namespace: Namespace, source: &SourceId, payload: &EncodedImage) {
        let entry = CacheEntry::new(namespace.key(source), payload.clone(), Utc::now());
        let record = StoredRecord::from_entry(&entry);

        if let Err(e) = self.backend.put(record).await {
            warn!(key = %entry.key, error = %e, "Durable store write failed");
            return;
        }
        debug!(key = %entry.key, size = payload.len(), "Stored image in durable store");

        if let Err(e) = self.evict_if_needed(namespace).await {
            warn!(namespace = %namespace, error = %e, "Durable store eviction failed");
        }
    }

    /// Number of entries in a namespace, zero on backend failure.
    pub async fn len(&self, namespace: Namespace) -> usize {
        self.backend
            .count(namespace.prefix())
            .await
            .unwrap_or_else(|e| {
                warn!(namespace = %namespace, error = %e, "Durable store count failed");
                0
            })
    }

    /// Deletes every entry of `namespace` older than the max age.
    /// Returns the number of deleted entries.
    pub async fn prune_expired(&self, namespace: Namespace) -> usize {
        match self.try_prune_expired(namespace).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(namespace = %namespace, removed, "Pruned expired durable entries");
                }
                removed
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Durable store prune failed");
                0
            }
        }
    }

    /// Removes every entry of both namespaces.
    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            warn!(error = %e, "Failed to clear durable store");
        } else {
            debug!("Cleared durable store");
        }
    }

    async fn evict_if_needed(&self, namespace: Namespace) -> StoreResult<()> {
        let _pass = self.eviction.lock().await;
        let prefix = namespace.prefix();
        let cap = self.config.capacity(namespace);
        let count = self.backend.count(prefix).await?;
        if count <= cap {
            return Ok(());
        }

        let target = count - cap + self.config.eviction_margin;
        debug!(
            namespace = %namespace,
            count,
            cap,
            target,
            "Durable store over capacity, evicting oldest entries"
        );

        let mut removed = 0usize;
        for entry in self.backend.oldest(prefix, target).await? {
            self.backend.delete(&entry.key).await?;
            removed += 1;
        }

        debug!(namespace = %namespace, removed, "Durable store eviction complete");
        Ok(())
    }

    async fn try_prune_expired(&self, namespace: Namespace) -> StoreResult<usize> {
        let prefix = namespace.prefix();
        let cutoff = Utc::now() - self.config.max_age;
        let count = self.backend.count(prefix).await?;

        let mut removed = 0usize;
        for entry in self.backend.oldest(prefix, count).await? {
            if entry.stored_at >= cutoff {
                break;
            }
            self.backend.delete(&entry.key).await?;
            removed += 1;
        }
        Ok(removed)
    }
}
