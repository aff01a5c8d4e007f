//! Sliding-window prefetcher.
//!
//! Keeps the files around a cursor on disk ahead of navigation by handing
//! the missing ones to the batch download service. Paths are kept across
//! window shifts; a file already downloaded is never requested again.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::SourceId;
use crate::domain::ports::{
    BatchDownloadPort, BatchEvent, BatchItem, BatchItemOutcome, BatchOptions, BatchRequest,
};

/// Default number of items prefetched on each side of the cursor.
pub const DEFAULT_RADIUS: usize = 10;

/// Result delivered to completion listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchOutcome {
    /// The source is available at this local path.
    Ready(PathBuf),
    /// The service returned the bytes inline; nothing was written locally.
    Delivered,
    /// The download failed.
    Failed(String),
}

type Listener = Box<dyn FnOnce(PrefetchOutcome) + Send>;

#[derive(Default)]
struct PrefetchState {
    current_id: u64,
    local_paths: HashMap<SourceId, PathBuf>,
    /// Source -> id of the batch that requested it.
    pending: HashMap<SourceId, u64>,
    listeners: HashMap<SourceId, Vec<Listener>>,
}

/// Maintains a window of prefetched local files around a cursor.
#[derive(Clone)]
pub struct Prefetcher {
    batch: Arc<dyn BatchDownloadPort>,
    options: BatchOptions,
    radius: usize,
    state: Arc<Mutex<PrefetchState>>,
}

impl std::fmt::Debug for Prefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prefetcher")
            .field("radius", &self.radius)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Prefetcher {
    #[must_use]
    pub fn new(batch: Arc<dyn BatchDownloadPort>, radius: usize, options: BatchOptions) -> Self {
        Self {
            batch,
            options,
            radius,
            state: Arc::new(Mutex::new(PrefetchState::default())),
        }
    }

    /// Index range covered by the window around `cursor`, clamped to `len`.
    #[must_use]
    pub fn window_bounds(&self, len: usize, cursor: usize) -> Option<RangeInclusive<usize>> {
        if len == 0 {
            return None;
        }
        let cursor = cursor.min(len - 1);
        let start = cursor.saturating_sub(self.radius);
        let end = cursor.saturating_add(self.radius).min(len - 1);
        Some(start..=end)
    }

    /// Requests every source in the window around `cursor` that is neither
    /// on disk nor already pending, as a single batch.
    ///
    /// Starts a new prefetch id. From now on, earlier batches only contribute
    /// finished downloads; their other events are ignored. Returns the number
    /// of sources requested.
    pub async fn prefetch_window(&self, sources: &[SourceId], cursor: usize) -> usize {
        let Some(bounds) = self.window_bounds(sources.len(), cursor) else {
            return 0;
        };

        let (request_id, delta) = {
            let mut state = self.state.lock();
            state.current_id += 1;
            let request_id = state.current_id;

            let mut seen = HashSet::new();
            let delta: Vec<SourceId> = sources[bounds]
                .iter()
                .filter(|s| seen.insert((*s).clone()))
                .filter(|s| !state.local_paths.contains_key(*s) && !state.pending.contains_key(*s))
                .cloned()
                .collect();

            for source in &delta {
                state.pending.insert(source.clone(), request_id);
            }
            (request_id, delta)
        };

        if delta.is_empty() {
            trace!(request_id, cursor, "Prefetch window already satisfied");
            return 0;
        }

        let requested = delta.len();
        let request = BatchRequest {
            request_id,
            sources: delta.clone(),
            options: self.options.clone(),
        };

        match self.batch.start(request).await {
            Ok(events) => {
                debug!(request_id, requested, cursor, "Started prefetch batch");
                let prefetcher = self.clone();
                tokio::spawn(async move {
                    prefetcher.consume(events).await;
                });
                requested
            }
            Err(e) => {
                warn!(request_id, error = %e, "Failed to start prefetch batch");
                let mut state = self.state.lock();
                for source in &delta {
                    if state.pending.get(source) == Some(&request_id) {
                        state.pending.remove(source);
                    }
                }
                0
            }
        }
    }

    /// Registers a one-shot listener for `source`.
    ///
    /// Fires immediately if the file is already on disk.
    pub fn on_prefetch_complete(
        &self,
        source: SourceId,
        callback: impl FnOnce(PrefetchOutcome) + Send + 'static,
    ) {
        let mut state = self.state.lock();
        if let Some(path) = state.local_paths.get(&source).cloned() {
            drop(state);
            callback(PrefetchOutcome::Ready(path));
            return;
        }
        state
            .listeners
            .entry(source)
            .or_default()
            .push(Box::new(callback));
    }

    /// Local file of a prefetched source.
    #[must_use]
    pub fn local_path(&self, source: &SourceId) -> Option<PathBuf> {
        self.state.lock().local_paths.get(source).cloned()
    }

    #[must_use]
    pub fn is_pending(&self, source: &SourceId) -> bool {
        self.state.lock().pending.contains_key(source)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn current_request_id(&self) -> u64 {
        self.state.lock().current_id
    }

    /// Forgets every recorded path, pending source and listener.
    ///
    /// Also supersedes any running batch.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.current_id += 1;
        state.local_paths.clear();
        state.pending.clear();
        state.listeners.clear();
        debug!("Cleared prefetch state");
    }

    async fn consume(&self, mut events: mpsc::UnboundedReceiver<BatchEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                BatchEvent::Item(item) => self.handle_item(item),
                BatchEvent::Summary(summary) => {
                    info!(
                        request_id = summary.request_id,
                        completed = summary.completed,
                        failed = summary.failed,
                        duration_ms = summary.duration_ms,
                        "Prefetch batch finished"
                    );
                    break;
                }
            }
        }
    }

    fn handle_item(&self, item: BatchItem) {
        let listeners = {
            let mut state = self.state.lock();

            if state.pending.get(&item.source) == Some(&item.request_id) {
                state.pending.remove(&item.source);
            }

            // A finished download is on disk whichever batch asked for it.
            let downloaded = matches!(item.outcome, BatchItemOutcome::Downloaded(_));
            if item.request_id < state.current_id && !downloaded {
                trace!(
                    request_id = item.request_id,
                    current = state.current_id,
                    source = %item.source,
                    "Discarding event from superseded prefetch batch"
                );
                return;
            }

            if let BatchItemOutcome::Downloaded(path) = &item.outcome {
                state.local_paths.insert(item.source.clone(), path.clone());
            }
            state.listeners.remove(&item.source).unwrap_or_default()
        };

        let outcome = match item.outcome {
            BatchItemOutcome::Downloaded(path) => {
                trace!(source = %item.source, path = %path.display(), "Prefetched");
                PrefetchOutcome::Ready(path)
            }
            BatchItemOutcome::Payload(_) => PrefetchOutcome::Delivered,
            BatchItemOutcome::Failed(reason) => {
                debug!(source = %item.source, reason = %reason, "Prefetch failed");
                PrefetchOutcome::Failed(reason)
            }
        };

        for listener in listeners {
            listener(outcome.clone());
        }
    }
}
