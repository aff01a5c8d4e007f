//! Process-local durable backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::errors::StoreResult;
use crate::domain::ports::{DurableBackend, RecencyEntry, StoredRecord};

/// In-memory [`DurableBackend`]. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put(&self, record: StoredRecord) -> StoreResult<()> {
        self.records.write().insert(record.key.clone(), record);
        Ok(())
    }

    async fn count(&self, prefix: &str) -> StoreResult<usize> {
        Ok(self
            .records
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .count())
    }

    async fn oldest(&self, prefix: &str, limit: usize) -> StoreResult<Vec<RecencyEntry>> {
        let records = self.records.read();
        let mut entries: Vec<RecencyEntry> = records
            .values()
            .filter(|r| r.key.starts_with(prefix))
            .map(|r| RecencyEntry {
                key: r.key.clone(),
                stored_at: r.stored_at,
            })
            .collect();
        entries.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.key.cmp(&b.key)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.records.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.records.write().clear();
        Ok(())
    }
}
