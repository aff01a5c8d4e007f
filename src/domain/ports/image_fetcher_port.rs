//! Port definition for network image transport.

use async_trait::async_trait;

use crate::domain::entities::{EncodedImage, SourceId};
use crate::domain::errors::LoadResult;

/// Port for fetching encoded image bytes from the network.
///
/// Implementations must be cancel-safe: the scheduler aborts in-flight
/// fetches by dropping their task.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Downloads the image behind `source`.
    async fn fetch(&self, source: &SourceId) -> LoadResult<EncodedImage>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use crate::domain::errors::LoadError;

    /// Scriptable fetcher for scheduler tests.
    ///
    /// Payloads default to the bytes of the source identifier. Gated sources
    /// block until their gate is released.
    #[derive(Default)]
    pub struct MockFetcher {
        calls: Mutex<Vec<SourceId>>,
        failures: Mutex<HashSet<SourceId>>,
        payloads: Mutex<HashMap<SourceId, EncodedImage>>,
        gates: Mutex<HashMap<SourceId, Arc<Notify>>>,
        delay: Option<Duration>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    struct ActiveGuard<'a>(&'a AtomicUsize);

    impl Drop for ActiveGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every fetch sleeps for `delay` before completing.
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        /// Makes fetches of `source` fail with a network error.
        pub fn fail(&self, source: impl Into<SourceId>) {
            self.failures.lock().insert(source.into());
        }

        pub fn set_payload(&self, source: impl Into<SourceId>, payload: EncodedImage) {
            self.payloads.lock().insert(source.into(), payload);
        }

        /// Blocks fetches of `source` until the returned gate is notified.
        pub fn gate(&self, source: impl Into<SourceId>) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates.lock().insert(source.into(), gate.clone());
            gate
        }

        pub fn calls(&self) -> Vec<SourceId> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self, source: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|s| s.as_str() == source)
                .count()
        }

        pub fn active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        pub fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageFetcher for MockFetcher {
        async fn fetch(&self, source: &SourceId) -> LoadResult<EncodedImage> {
            self.calls.lock().push(source.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let _guard = ActiveGuard(&self.active);

            let gate = self.gates.lock().get(source).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.failures.lock().contains(source) {
                return Err(LoadError::network(format!("HTTP 403 for {source}")));
            }
            Ok(self
                .payloads
                .lock()
                .get(source)
                .cloned()
                .unwrap_or_else(|| EncodedImage::from(source.as_str().as_bytes().to_vec())))
        }
    }
}
