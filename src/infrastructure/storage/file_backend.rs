//! Disk-based durable backend for persistence across sessions.
//!
//! One JSON record per key, named after the SHA-256 of the key. The recency
//! index lives in memory and is rebuilt by scanning the directory on open.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::ports::{DurableBackend, RecencyEntry, StoredRecord};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// File-per-record [`DurableBackend`].
pub struct FileBackend {
    dir: PathBuf,
    index: Mutex<HashMap<String, DateTime<Utc>>>,
    /// Distinguishes temp files of concurrent writes to one key.
    write_seq: AtomicU64,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("dir", &self.dir)
            .field("entries", &self.index.lock().len())
            .finish()
    }
}

impl FileBackend {
    /// Opens (creating if needed) a backend rooted at `dir`.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or listed.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Io(format!("failed to create store dir: {e}")))?;

        let mut index = HashMap::new();
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::Io(format!("failed to read store dir: {e}")))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                trace!(path = %path.display(), "Removing interrupted write");
                let _ = fs::remove_file(&path).await;
                continue;
            }
            if path.extension().is_none_or(|ext| ext != RECORD_EXTENSION) {
                continue;
            }
            match read_record(&path).await {
                Ok(record) => {
                    index.insert(record.key, record.stored_at);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Removing unreadable store record");
                    let _ = fs::remove_file(&path).await;
                }
            }
        }

        debug!(dir = %dir.display(), entries = index.len(), "Opened durable file store");

        Ok(Self {
            dir,
            index: Mutex::new(index),
            write_seq: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", hex::encode(digest)))
    }
}

async fn read_record(path: &Path) -> StoreResult<StoredRecord> {
    let raw = fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

#[async_trait]
impl DurableBackend for FileBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        if !self.index.lock().contains_key(key) {
            return Ok(None);
        }
        let path = self.record_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.index.lock().remove(key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        trace!(key = %key, path = %path.display(), "Read store record");
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn put(&self, record: StoredRecord) -> StoreResult<()> {
        let path = self.record_path(&record.key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{seq}.{TEMP_EXTENSION}"));
        let raw = serde_json::to_vec(&record)?;

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| StoreError::Io(format!("failed to create record file: {e}")))?;
        file.write_all(&raw)
            .await
            .map_err(|e| StoreError::Io(format!("failed to write record file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Io(format!("failed to flush record file: {e}")))?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Io(format!("failed to move record into place: {e}")))?;

        self.index.lock().insert(record.key, record.stored_at);
        Ok(())
    }

    async fn count(&self, prefix: &str) -> StoreResult<usize> {
        Ok(self
            .index
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .count())
    }

    async fn oldest(&self, prefix: &str, limit: usize) -> StoreResult<Vec<RecencyEntry>> {
        let mut entries: Vec<RecencyEntry> = self
            .index
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, at)| RecencyEntry {
                key: k.clone(),
                stored_at: *at,
            })
            .collect();
        entries.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.key.cmp(&b.key)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.record_path(key);
        if let Err(e) = fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(StoreError::Io(format!("failed to remove record: {e}")));
        }
        self.index.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::Io(format!("failed to read store dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(format!("failed to read entry: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
                && fs::remove_file(&path).await.is_err()
            {
                warn!(path = %path.display(), "Failed to remove store record");
            }
        }
        self.index.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn record(key: &str, minutes_ago: i64) -> StoredRecord {
        StoredRecord {
            key: key.to_string(),
            payload: "aGVsbG8=".to_string(),
            stored_at: Utc::now() - TimeDelta::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let backend = FileBackend::open(temp.path()).await?;

        backend.put(record("full:https://x/a.png", 0)).await?;

        let read = backend.get("full:https://x/a.png").await?;
        assert_eq!(read.map(|r| r.payload), Some("aGVsbG8=".to_string()));
        assert!(backend.get("full:missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_index_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        {
            let backend = FileBackend::open(temp.path()).await?;
            backend.put(record("full:a", 10)).await?;
            backend.put(record("full:b", 1)).await?;
            backend.put(record("thumb:a", 5)).await?;
        }

        let reopened = FileBackend::open(temp.path()).await?;
        assert_eq!(reopened.count("full:").await?, 2);
        assert_eq!(reopened.count("thumb:").await?, 1);

        let oldest = reopened.oldest("full:", 1).await?;
        assert_eq!(oldest[0].key, "full:a");
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_records_are_dropped_on_open() -> Result<(), Box<dyn std::error::Error>>
    {
        let temp = TempDir::new()?;
        std::fs::write(temp.path().join("garbage.json"), b"{not json")?;

        let backend = FileBackend::open(temp.path()).await?;

        assert_eq!(backend.count("").await?, 0);
        assert!(!temp.path().join("garbage.json").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_one_key_stay_readable()
    -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let backend = FileBackend::open(temp.path()).await?;
        let first = StoredRecord {
            payload: "a".repeat(256 * 1024),
            ..record("full:same", 1)
        };
        let second = StoredRecord {
            payload: "b".repeat(64 * 1024),
            ..record("full:same", 0)
        };

        let (a, b) = tokio::join!(backend.put(first.clone()), backend.put(second.clone()));
        a?;
        b?;

        let read = backend.get("full:same").await?.map(|r| r.payload);
        assert!(read == Some(first.payload) || read == Some(second.payload));
        assert_eq!(backend.count("full:").await?, 1);
        let leftovers = std::fs::read_dir(temp.path())?
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == TEMP_EXTENSION))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_interrupted_writes_are_removed_on_open()
    -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        std::fs::write(temp.path().join("abc.3.tmp"), b"{\"key\":")?;

        let backend = FileBackend::open(temp.path()).await?;

        assert_eq!(backend.count("").await?, 0);
        assert!(!temp.path().join("abc.3.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_and_clear() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let backend = FileBackend::open(temp.path()).await?;
        backend.put(record("full:a", 0)).await?;
        backend.put(record("full:b", 0)).await?;

        backend.delete("full:a").await?;
        backend.delete("full:a").await?;
        assert!(backend.get("full:a").await?.is_none());
        assert_eq!(backend.count("full:").await?, 1);

        backend.clear().await?;
        assert_eq!(backend.count("").await?, 0);
        Ok(())
    }
}
