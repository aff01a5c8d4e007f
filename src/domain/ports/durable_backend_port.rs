//! Port definition for the durable key-value backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{CacheEntry, EncodedImage};
use crate::domain::errors::{StoreError, StoreResult};

/// Persisted form of a [`CacheEntry`]: the payload is stored as base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub payload: String,
    pub stored_at: DateTime<Utc>,
}

impl StoredRecord {
    #[must_use]
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            payload: entry.payload.to_base64(),
            stored_at: entry.stored_at,
        }
    }

    /// Decodes the payload back into a cache entry.
    ///
    /// # Errors
    /// Returns [`StoreError::Corrupt`] if the payload is not valid base64.
    pub fn into_entry(self) -> StoreResult<CacheEntry> {
        let payload = EncodedImage::from_base64(&self.payload).map_err(|e| StoreError::Corrupt {
            key: self.key.clone(),
            reason: e.to_string(),
        })?;
        Ok(CacheEntry::new(self.key, payload, self.stored_at))
    }
}

/// One position of the recency cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecencyEntry {
    pub key: String,
    pub stored_at: DateTime<Utc>,
}

/// Async key-value backend with a secondary index on `stored_at`.
#[async_trait]
pub trait DurableBackend: Send + Sync {
    /// Reads the record stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>>;

    /// Inserts or replaces a record.
    async fn put(&self, record: StoredRecord) -> StoreResult<()>;

    /// Counts the records whose key starts with `prefix`.
    async fn count(&self, prefix: &str) -> StoreResult<usize>;

    /// Returns up to `limit` records under `prefix`, oldest first.
    async fn oldest(&self, prefix: &str, limit: usize) -> StoreResult<Vec<RecencyEntry>>;

    /// Removes the record under `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Removes every record.
    async fn clear(&self) -> StoreResult<()>;
}
