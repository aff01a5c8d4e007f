//! Port definition for the external batch download/thumbnail service.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::entities::{EncodedImage, SourceId};
use crate::domain::errors::LoadResult;

/// Options forwarded to the batch service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Directory the service writes downloaded files into.
    pub output_dir: Option<PathBuf>,
    /// Downscale each image so its longer edge fits this bound.
    pub max_edge: Option<u32>,
    /// Return encoded bytes instead of writing files.
    pub return_payload: bool,
}

/// A batch of sources correlated by a caller-supplied identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub request_id: u64,
    pub sources: Vec<SourceId>,
    pub options: BatchOptions,
}

/// Per-item result reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItemOutcome {
    /// The image was written to a local file.
    Downloaded(PathBuf),
    /// The image bytes were returned inline.
    Payload(EncodedImage),
    /// The item failed.
    Failed(String),
}

impl BatchItemOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub request_id: u64,
    pub source: SourceId,
    pub outcome: BatchItemOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub request_id: u64,
    pub completed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Events streamed back for one batch; a `Summary` terminates the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Item(BatchItem),
    Summary(BatchSummary),
}

impl BatchEvent {
    #[must_use]
    pub const fn request_id(&self) -> u64 {
        match self {
            Self::Item(item) => item.request_id,
            Self::Summary(summary) => summary.request_id,
        }
    }
}

/// Port for the batch download service.
#[async_trait]
pub trait BatchDownloadPort: Send + Sync {
    /// Starts a batch and returns the stream of its events.
    async fn start(&self, request: BatchRequest) -> LoadResult<mpsc::UnboundedReceiver<BatchEvent>>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Records requests and lets the test drive each batch's event stream.
    #[derive(Default)]
    pub struct MockBatchService {
        batches: Mutex<Vec<(BatchRequest, mpsc::UnboundedSender<BatchEvent>)>>,
    }

    impl MockBatchService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn requests(&self) -> Vec<BatchRequest> {
            self.batches.lock().iter().map(|(r, _)| r.clone()).collect()
        }

        pub fn batch_count(&self) -> usize {
            self.batches.lock().len()
        }

        /// Emits an item event on the `index`-th batch.
        pub fn complete(&self, index: usize, source: &str, outcome: BatchItemOutcome) {
            let batches = self.batches.lock();
            let (request, tx) = &batches[index];
            let _ = tx.send(BatchEvent::Item(BatchItem {
                request_id: request.request_id,
                source: SourceId::new(source),
                outcome,
            }));
        }

        /// Emits the summary event on the `index`-th batch.
        pub fn finish(&self, index: usize, completed: usize, failed: usize) {
            let batches = self.batches.lock();
            let (request, tx) = &batches[index];
            let _ = tx.send(BatchEvent::Summary(BatchSummary {
                request_id: request.request_id,
                completed,
                failed,
                duration_ms: 1,
            }));
        }
    }

    #[async_trait]
    impl BatchDownloadPort for MockBatchService {
        async fn start(
            &self,
            request: BatchRequest,
        ) -> LoadResult<mpsc::UnboundedReceiver<BatchEvent>> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.batches.lock().push((request, tx));
            Ok(rx)
        }
    }
}
