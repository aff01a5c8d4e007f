//! reqwest-backed batch download service.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::entities::{EncodedImage, SourceId};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{
    BatchDownloadPort, BatchEvent, BatchItem, BatchItemOutcome, BatchOptions, BatchRequest,
    BatchSummary,
};
use crate::infrastructure::image::{ThumbnailDeriver, thumbnail};

use super::fetcher::{build_client, download};

/// Default parallelism inside one batch.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Downloads batches of images, writing files or returning payloads.
#[derive(Debug, Clone)]
pub struct HttpBatchDownloader {
    client: Client,
    default_dir: PathBuf,
    concurrency: usize,
}

impl HttpBatchDownloader {
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        default_dir: impl Into<PathBuf>,
        concurrency: usize,
    ) -> LoadResult<Self> {
        Ok(Self {
            client: build_client(timeout, user_agent)?,
            default_dir: default_dir.into(),
            concurrency: concurrency.max(1),
        })
    }
}

/// File name for a downloaded source: hash of the identifier plus an
/// extension guessed from the payload.
fn file_name_for(source: &SourceId, payload: &EncodedImage) -> String {
    let digest = hex::encode(Sha256::digest(source.as_str().as_bytes()));
    let ext = payload
        .format()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("img");
    format!("{digest}.{ext}")
}

async fn process_item(
    client: &Client,
    source: &SourceId,
    options: &BatchOptions,
    dir: &Path,
) -> LoadResult<BatchItemOutcome> {
    let payload = download(client, source, None).await?;

    let payload = match options.max_edge {
        Some(edge) => {
            ThumbnailDeriver::new(edge, thumbnail::DEFAULT_QUALITY)
                .derive_async(payload)
                .await?
        }
        None => payload,
    };

    if options.return_payload {
        return Ok(BatchItemOutcome::Payload(payload));
    }

    let path = dir.join(file_name_for(source, &payload));
    tokio::fs::write(&path, payload.as_bytes())
        .await
        .map_err(|e| LoadError::cache(format!("failed to write {}: {e}", path.display())))?;
    Ok(BatchItemOutcome::Downloaded(path))
}

#[async_trait]
impl BatchDownloadPort for HttpBatchDownloader {
    async fn start(&self, request: BatchRequest) -> LoadResult<mpsc::UnboundedReceiver<BatchEvent>> {
        let dir = request
            .options
            .output_dir
            .clone()
            .unwrap_or_else(|| self.default_dir.clone());
        if !request.options.return_payload {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| LoadError::cache(format!("failed to create output dir: {e}")))?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let concurrency = self.concurrency;

        tokio::spawn(async move {
            let started = Instant::now();
            let BatchRequest {
                request_id,
                sources,
                options,
            } = request;
            debug!(request_id, count = sources.len(), "Running batch download");

            let mut results = stream::iter(sources)
                .map(|source| {
                    let client = &client;
                    let options = &options;
                    let dir = &dir;
                    async move {
                        let outcome = match process_item(client, &source, options, dir).await {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                warn!(source = %source, error = %e, "Batch item failed");
                                BatchItemOutcome::Failed(e.to_string())
                            }
                        };
                        BatchItem {
                            request_id,
                            source,
                            outcome,
                        }
                    }
                })
                .buffer_unordered(concurrency);

            let (mut completed, mut failed) = (0usize, 0usize);
            while let Some(item) = results.next().await {
                if item.outcome.is_success() {
                    completed += 1;
                } else {
                    failed += 1;
                }
                if tx.send(BatchEvent::Item(item)).is_err() {
                    debug!(request_id, "Batch receiver dropped, stopping");
                    return;
                }
            }

            let _ = tx.send(BatchEvent::Summary(BatchSummary {
                request_id,
                completed,
                failed,
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }));
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_uses_hash_and_sniffed_extension() {
        let source = SourceId::new("https://x/a");
        let png_magic: &'static [u8] = b"\x89PNG\r\n\x1a\n\0\0\0\0";

        let png_name = file_name_for(&source, &EncodedImage::from(png_magic));
        let unknown_name = file_name_for(&source, &EncodedImage::from(vec![1, 2, 3]));

        assert!(png_name.ends_with(".png"));
        assert!(unknown_name.ends_with(".img"));
        assert_eq!(png_name.len(), 64 + ".png".len());
    }

    #[tokio::test]
    async fn test_unreachable_sources_fail_and_summarize() -> Result<(), Box<dyn std::error::Error>>
    {
        let temp = tempfile::TempDir::new()?;
        let downloader = HttpBatchDownloader::new(
            Duration::from_secs(1),
            crate::infrastructure::http::DEFAULT_USER_AGENT,
            temp.path(),
            2,
        )?;

        let mut events = downloader
            .start(BatchRequest {
                request_id: 7,
                sources: vec![SourceId::new("/local/a.jpg"), SourceId::new("not-a-url")],
                options: BatchOptions::default(),
            })
            .await?;

        let mut items = 0;
        let mut summary = None;
        while let Some(event) = events.recv().await {
            match event {
                BatchEvent::Item(item) => {
                    assert_eq!(item.request_id, 7);
                    assert!(!item.outcome.is_success());
                    items += 1;
                }
                BatchEvent::Summary(s) => summary = Some(s),
            }
        }

        assert_eq!(items, 2);
        assert_eq!(summary.map(|s| (s.completed, s.failed)), Some((0, 2)));
        Ok(())
    }
}
