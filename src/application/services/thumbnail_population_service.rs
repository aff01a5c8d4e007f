use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use crate::domain::entities::{EncodedImage, SourceId};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{
    BatchDownloadPort, BatchEvent, BatchItemOutcome, BatchOptions, BatchRequest, BatchSummary,
};
use crate::infrastructure::image::ImageLoader;

/// Fills the thumbnail tier in bulk through the batch service.
pub struct BulkThumbnailService {
    loader: ImageLoader,
    batch: Arc<dyn BatchDownloadPort>,
    max_edge: u32,
    next_request_id: AtomicU64,
}

impl std::fmt::Debug for BulkThumbnailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkThumbnailService")
            .field("max_edge", &self.max_edge)
            .finish_non_exhaustive()
    }
}

impl BulkThumbnailService {
    #[must_use]
    pub fn new(loader: ImageLoader, batch: Arc<dyn BatchDownloadPort>, max_edge: u32) -> Self {
        Self {
            loader,
            batch,
            max_edge,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Requests thumbnails for every source not already in the thumbnail
    /// tier and stores each one as it arrives.
    ///
    /// # Errors
    /// Returns an error if the batch cannot be started, or
    /// [`LoadError::Abort`] if the loader is cancelled while it runs.
    pub async fn populate(&self, sources: &[SourceId]) -> LoadResult<BatchSummary> {
        let missing: Vec<SourceId> = sources
            .iter()
            .filter(|s| self.loader.get_cached_thumbnail(s).is_none())
            .cloned()
            .collect();

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        if missing.is_empty() {
            return Ok(BatchSummary {
                request_id,
                ..BatchSummary::default()
            });
        }

        let generation = self.loader.current_generation();
        let started = Instant::now();
        let requested = missing.len();
        let mut events = self
            .batch
            .start(BatchRequest {
                request_id,
                sources: missing,
                options: BatchOptions {
                    output_dir: None,
                    max_edge: Some(self.max_edge),
                    return_payload: true,
                },
            })
            .await?;
        debug!(request_id, requested, "Started bulk thumbnail batch");

        let (mut completed, mut failed) = (0usize, 0usize);
        while let Some(event) = events.recv().await {
            if self.loader.current_generation() != generation {
                return Err(LoadError::Abort);
            }
            if event.request_id() != request_id {
                continue;
            }
            match event {
                BatchEvent::Item(item) => match item.outcome {
                    BatchItemOutcome::Payload(thumb) => {
                        self.loader.store_thumbnail(item.source, thumb);
                        completed += 1;
                    }
                    BatchItemOutcome::Downloaded(path) => match tokio::fs::read(&path).await {
                        Ok(raw) => {
                            self.loader
                                .store_thumbnail(item.source, EncodedImage::from(raw));
                            completed += 1;
                        }
                        Err(e) => {
                            debug!(path = %path.display(), error = %e, "Unreadable thumbnail file");
                            failed += 1;
                        }
                    },
                    BatchItemOutcome::Failed(reason) => {
                        debug!(source = %item.source, reason = %reason, "Thumbnail unavailable");
                        failed += 1;
                    }
                },
                BatchEvent::Summary(summary) => {
                    info!(
                        request_id,
                        completed = summary.completed,
                        failed = summary.failed,
                        duration_ms = summary.duration_ms,
                        "Bulk thumbnail batch finished"
                    );
                    return Ok(summary);
                }
            }
        }

        Ok(BatchSummary {
            request_id,
            completed,
            failed,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::{MockBatchService, MockFetcher};
    use crate::infrastructure::image::loader::test_support::{loader_with, wait_until};

    #[tokio::test]
    async fn test_populates_thumbnail_tier() {
        let loader = loader_with(Arc::new(MockFetcher::new()), 6);
        let batch = Arc::new(MockBatchService::new());
        let service = Arc::new(BulkThumbnailService::new(loader.clone(), batch.clone(), 256));
        let sources = vec![SourceId::new("https://x/a.jpg"), SourceId::new("https://x/b.jpg")];

        let task = {
            let service = service.clone();
            let sources = sources.clone();
            tokio::spawn(async move { service.populate(&sources).await })
        };
        wait_until(|| batch.batch_count() == 1).await;

        let requests = batch.requests();
        let request = &requests[0];
        assert_eq!(request.options.max_edge, Some(256));
        assert!(request.options.return_payload);

        batch.complete(0, "https://x/a.jpg", BatchItemOutcome::Payload(EncodedImage::from(vec![1])));
        batch.complete(0, "https://x/b.jpg", BatchItemOutcome::Failed("timeout".into()));
        batch.finish(0, 1, 1);

        let summary = task.await.expect("populate task").expect("summary");
        assert_eq!((summary.completed, summary.failed), (1, 1));
        assert_eq!(
            loader.get_cached_thumbnail(&sources[0]),
            Some(EncodedImage::from(vec![1]))
        );
        assert!(loader.get_cached_thumbnail(&sources[1]).is_none());
    }

    #[tokio::test]
    async fn test_skips_sources_already_cached() {
        let loader = loader_with(Arc::new(MockFetcher::new()), 6);
        let batch = Arc::new(MockBatchService::new());
        let service = BulkThumbnailService::new(loader.clone(), batch.clone(), 256);
        let source = SourceId::new("https://x/a.jpg");
        loader.store_thumbnail(source.clone(), EncodedImage::from(vec![7]));

        let summary = service.populate(&[source]).await;

        assert_eq!(summary.map(|s| s.completed), Ok(0));
        assert_eq!(batch.batch_count(), 0);
    }
}
