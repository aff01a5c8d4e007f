//! Priority-scheduled image loading orchestrator.
//!
//! Resolution order: memory cache, durable store, then a network fetch
//! admitted under a concurrency cap. Concurrent requests for the same source
//! share one fetch. [`ImageLoader::cancel_all`] advances the generation;
//! every continuation re-checks it after each await before touching shared
//! state.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{EncodedImage, Generation, Namespace, Priority, SourceId};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::ImageFetcher;

use super::durable_store::DurableStore;
use super::memory_cache::{self, CacheStats, MemoryImageCache};
use super::thumbnail::ThumbnailDeriver;

/// Default cap on simultaneous network fetches.
pub const DEFAULT_MAX_CONCURRENT: usize = 6;

/// Configuration for the image loader.
#[derive(Debug, Clone)]
pub struct ImageLoaderConfig {
    /// Maximum simultaneous network fetches.
    pub max_concurrent: usize,
    /// Maximum full-size images in memory.
    pub memory_cache_size: usize,
    /// Maximum thumbnails in memory.
    pub thumbnail_cache_size: usize,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            memory_cache_size: memory_cache::DEFAULT_FULL_CAPACITY,
            thumbnail_cache_size: memory_cache::DEFAULT_THUMBNAIL_CAPACITY,
        }
    }
}

type Waiter = oneshot::Sender<LoadResult<EncodedImage>>;

/// Callers waiting on one source and the highest priority any of them asked for.
struct PendingEntry {
    waiters: Vec<Waiter>,
    priority: Priority,
}

#[derive(Debug)]
struct QueueItem {
    source: SourceId,
    priority: Priority,
    seq: u64,
}

impl QueueItem {
    fn sort_key(&self) -> (Priority, u64) {
        (self.priority, self.seq)
    }
}

#[derive(Default)]
struct SchedulerState {
    generation: Generation,
    /// Sorted by priority, then arrival.
    queue: VecDeque<QueueItem>,
    /// Every source with an outstanding load, with the callers waiting on it.
    pending: HashMap<SourceId, PendingEntry>,
    in_flight: HashMap<SourceId, AbortHandle>,
    active: usize,
    next_seq: u64,
}

impl SchedulerState {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn take_waiters(&mut self, source: &SourceId) -> Vec<Waiter> {
        self.pending
            .remove(source)
            .map(|entry| entry.waiters)
            .unwrap_or_default()
    }

    fn enqueue(&mut self, item: QueueItem) {
        let key = item.sort_key();
        let at = self.queue.partition_point(|queued| queued.sort_key() <= key);
        self.queue.insert(at, item);
    }

    /// Moves a queued source up if a later request asks for a higher priority.
    fn promote(&mut self, source: &SourceId, priority: Priority) {
        let Some(pos) = self.queue.iter().position(|item| &item.source == source) else {
            return;
        };
        if self.queue[pos].priority <= priority {
            return;
        }
        if let Some(mut item) = self.queue.remove(pos) {
            item.priority = priority;
            self.enqueue(item);
        }
    }
}

struct LoaderInner {
    config: ImageLoaderConfig,
    memory: MemoryImageCache,
    thumbnails: MemoryImageCache,
    store: Arc<DurableStore>,
    fetcher: Arc<dyn ImageFetcher>,
    deriver: ThumbnailDeriver,
    state: Mutex<SchedulerState>,
}

/// Orchestrates image loading from memory, durable store and network.
///
/// Cheap to clone; clones share caches and scheduler state. Must be used from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Future returned by [`ImageLoader::request`].
///
/// Resolves with [`LoadError::Abort`] if the load is cancelled.
#[derive(Debug)]
pub struct PendingLoad {
    inner: PendingInner,
}

#[derive(Debug)]
enum PendingInner {
    Ready(Option<LoadResult<EncodedImage>>),
    Waiting(oneshot::Receiver<LoadResult<EncodedImage>>),
}

impl PendingLoad {
    fn ready(result: LoadResult<EncodedImage>) -> Self {
        Self {
            inner: PendingInner::Ready(Some(result)),
        }
    }

    fn waiting(rx: oneshot::Receiver<LoadResult<EncodedImage>>) -> Self {
        Self {
            inner: PendingInner::Waiting(rx),
        }
    }
}

impl Future for PendingLoad {
    type Output = LoadResult<EncodedImage>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            PendingInner::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(LoadError::Abort)))
            }
            PendingInner::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(LoadError::Abort))),
        }
    }
}

fn deliver(waiters: Vec<Waiter>, result: &LoadResult<EncodedImage>) {
    for waiter in waiters {
        let _ = waiter.send(result.clone());
    }
}

impl ImageLoader {
    /// Creates a loader over the given fetcher and durable store.
    #[must_use]
    pub fn new(
        config: ImageLoaderConfig,
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<DurableStore>,
        deriver: ThumbnailDeriver,
    ) -> Self {
        let inner = LoaderInner {
            memory: MemoryImageCache::new("full", config.memory_cache_size),
            thumbnails: MemoryImageCache::new("thumbnail", config.thumbnail_cache_size),
            config: ImageLoaderConfig {
                max_concurrent: config.max_concurrent.max(1),
                ..config
            },
            store,
            fetcher,
            deriver,
            state: Mutex::new(SchedulerState::default()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Registers a load and returns a future for its result.
    ///
    /// Registration is synchronous: queue position among equal priorities is
    /// the order of `request` calls. A request for a source that is already
    /// loading joins the outstanding load instead of starting another one.
    pub fn request(&self, source: SourceId, priority: Priority) -> PendingLoad {
        self.register(source, priority, None)
    }

    /// Registers a load on behalf of a caller that started in `expected`.
    ///
    /// Resolves with [`LoadError::Abort`] without touching the scheduler if
    /// the generation has moved on since.
    fn register(
        &self,
        source: SourceId,
        priority: Priority,
        expected: Option<Generation>,
    ) -> PendingLoad {
        if let Some(img) = self.inner.memory.get(&source) {
            return PendingLoad::ready(Ok(img));
        }

        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.state.lock();

        if expected.is_some_and(|generation| generation != state.generation) {
            return PendingLoad::ready(Err(LoadError::Abort));
        }

        if let Some(img) = self.inner.memory.peek(&source) {
            return PendingLoad::ready(Ok(img));
        }

        if let Some(entry) = state.pending.get_mut(&source) {
            entry.waiters.push(tx);
            entry.priority = entry.priority.min(priority);
            state.promote(&source, priority);
            trace!(source = %source, priority = %priority, "Joined in-flight load");
            return PendingLoad::waiting(rx);
        }

        state.pending.insert(
            source.clone(),
            PendingEntry {
                waiters: vec![tx],
                priority,
            },
        );
        let seq = state.next_seq();
        let generation = state.generation;
        drop(state);

        let loader = self.clone();
        tokio::spawn(async move {
            loader.resolve(source, seq, generation).await;
        });

        PendingLoad::waiting(rx)
    }

    /// Loads an image, checking caches first.
    ///
    /// # Errors
    /// Returns [`LoadError::Network`] if the fetch fails and
    /// [`LoadError::Abort`] if the load was cancelled.
    pub async fn load(&self, source: SourceId, priority: Priority) -> LoadResult<EncodedImage> {
        self.request(source, priority).await
    }

    /// Loads the thumbnail of `source`.
    ///
    /// Falls back to the full-size payload when no thumbnail can be derived.
    ///
    /// # Errors
    /// Same as [`Self::load`].
    pub async fn load_thumbnail(
        &self,
        source: SourceId,
        priority: Priority,
    ) -> LoadResult<EncodedImage> {
        if let Some(thumb) = self.inner.thumbnails.get(&source) {
            return Ok(thumb);
        }

        let generation = self.current_generation();
        let stored = self.inner.store.get(Namespace::Thumbnail, &source).await;
        self.ensure_current(generation)?;
        if let Some(thumb) = stored {
            self.inner.thumbnails.put(source, thumb.clone());
            return Ok(thumb);
        }

        let full = self
            .register(source.clone(), priority, Some(generation))
            .await?;
        self.ensure_current(generation)?;
        if let Some(thumb) = self.inner.thumbnails.get(&source) {
            return Ok(thumb);
        }

        let derived = self.inner.deriver.derive_async(full.clone()).await;
        self.ensure_current(generation)?;
        match derived {
            Ok(thumb) => {
                self.inner.thumbnails.put(source.clone(), thumb.clone());
                self.spawn_durable_write(Namespace::Thumbnail, source, thumb.clone(), generation);
                Ok(thumb)
            }
            Err(e) => {
                debug!(source = %source, error = %e, "No thumbnail, using full image");
                Ok(full)
            }
        }
    }

    /// Returns a full-size image already in memory, promoting it.
    #[must_use]
    pub fn get_cached(&self, source: &SourceId) -> Option<EncodedImage> {
        self.inner.memory.get(source)
    }

    /// Returns a thumbnail already in memory, promoting it.
    #[must_use]
    pub fn get_cached_thumbnail(&self, source: &SourceId) -> Option<EncodedImage> {
        self.inner.thumbnails.get(source)
    }

    /// Writes an image obtained elsewhere into both tiers and derives its
    /// thumbnail.
    pub fn store(&self, source: SourceId, image: EncodedImage) {
        let generation = self.current_generation();
        self.inner.memory.put(source.clone(), image.clone());
        self.spawn_durable_write(Namespace::Full, source.clone(), image.clone(), generation);
        self.spawn_thumbnail(source, image, generation);
    }

    /// Writes a thumbnail obtained elsewhere into both thumbnail tiers.
    pub fn store_thumbnail(&self, source: SourceId, thumbnail: EncodedImage) {
        let generation = self.current_generation();
        self.inner.thumbnails.put(source.clone(), thumbnail.clone());
        self.spawn_durable_write(Namespace::Thumbnail, source, thumbnail, generation);
    }

    /// Cancels every queued and in-flight load.
    ///
    /// Waiting callers receive [`LoadError::Abort`]; in-flight fetches are
    /// aborted and the concurrency counter is reset so new loads are admitted
    /// immediately.
    pub fn cancel_all(&self) {
        let (waiters, queued, aborted, generation) = {
            let mut state = self.inner.state.lock();
            state.generation = state.generation.next();
            let queued = state.queue.len();
            state.queue.clear();
            let aborted = state.in_flight.len();
            for (_, handle) in state.in_flight.drain() {
                handle.abort();
            }
            state.active = 0;
            let waiters: Vec<Waiter> = state
                .pending
                .drain()
                .flat_map(|(_, entry)| entry.waiters)
                .collect();
            (waiters, queued, aborted, state.generation)
        };

        let cancelled = waiters.len();
        deliver(waiters, &Err(LoadError::Abort));

        if cancelled > 0 || queued > 0 || aborted > 0 {
            info!(
                generation = %generation,
                queued,
                aborted,
                cancelled,
                "Cancelled all pending image loads"
            );
        }
    }

    #[must_use]
    pub fn current_generation(&self) -> Generation {
        self.inner.state.lock().generation
    }

    fn ensure_current(&self, generation: Generation) -> LoadResult<()> {
        if self.current_generation() == generation {
            Ok(())
        } else {
            Err(LoadError::Abort)
        }
    }

    /// Returns true if `source` has an outstanding load.
    #[must_use]
    pub fn is_loading(&self, source: &SourceId) -> bool {
        self.inner.state.lock().pending.contains_key(source)
    }

    /// Number of sources with an outstanding load.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of sources waiting for a fetch slot.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Number of fetches currently holding a slot.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().active
    }

    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.inner.memory.stats()
    }

    #[must_use]
    pub fn thumbnail_cache_stats(&self) -> CacheStats {
        self.inner.thumbnails.stats()
    }

    #[must_use]
    pub fn durable_store(&self) -> &Arc<DurableStore> {
        &self.inner.store
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.inner.memory.clear();
        self.inner.thumbnails.clear();
        self.inner.store.clear().await;
        info!("Cleared all image caches");
    }

    /// Durable lookup, then hand-off to the fetch queue.
    async fn resolve(&self, source: SourceId, seq: u64, generation: Generation) {
        let cached = self.inner.store.get(Namespace::Full, &source).await;

        let mut state = self.inner.state.lock();
        if state.generation != generation {
            trace!(source = %source, "Dropping durable lookup from cancelled generation");
            return;
        }
        // Duplicates may have raised the priority while the lookup ran.
        let Some(priority) = state.pending.get(&source).map(|entry| entry.priority) else {
            return;
        };

        if let Some(img) = cached {
            self.inner.memory.put(source.clone(), img.clone());
            let waiters = state.take_waiters(&source);
            drop(state);
            debug!(source = %source, "Image loaded from durable store");
            deliver(waiters, &Ok(img));
            return;
        }

        if !source.is_network_addressable() {
            let waiters = state.take_waiters(&source);
            drop(state);
            warn!(source = %source, "Source is not cached and not network-addressable");
            deliver(
                waiters,
                &Err(LoadError::network(format!("{source} is not network-addressable"))),
            );
            return;
        }

        state.enqueue(QueueItem {
            source,
            priority,
            seq,
        });
        drop(state);
        self.pump();
    }

    /// Admits queued items while slots are free.
    fn pump(&self) {
        let mut state = self.inner.state.lock();
        while state.active < self.inner.config.max_concurrent {
            let Some(item) = state.queue.pop_front() else {
                break;
            };
            state.active += 1;
            let generation = state.generation;
            let source = item.source.clone();
            trace!(
                source = %source,
                priority = %item.priority,
                active = state.active,
                "Admitted network fetch"
            );

            let loader = self.clone();
            let handle = tokio::spawn(async move {
                loader.fetch(item, generation).await;
            });
            state.in_flight.insert(source, handle.abort_handle());
        }
    }

    async fn fetch(&self, item: QueueItem, generation: Generation) {
        debug!(source = %item.source, priority = %item.priority, "Downloading image from network");
        let result = self
            .inner
            .fetcher
            .fetch(&item.source)
            .await
            .map_err(|e| match e {
                LoadError::Network { .. } | LoadError::Abort => e,
                other => LoadError::network(other.to_string()),
            });

        let waiters = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                debug!(source = %item.source, "Discarding fetch from cancelled generation");
                return;
            }
            state.active = state.active.saturating_sub(1);
            state.in_flight.remove(&item.source);
            let waiters = state.take_waiters(&item.source);

            if let Ok(img) = &result {
                self.inner.memory.put(item.source.clone(), img.clone());
                self.spawn_durable_write(
                    Namespace::Full,
                    item.source.clone(),
                    img.clone(),
                    generation,
                );
                self.spawn_thumbnail(item.source.clone(), img.clone(), generation);
            }
            waiters
        };

        match &result {
            Ok(img) => {
                debug!(source = %item.source, size = img.len(), "Image loaded from network");
            }
            Err(e) => warn!(source = %item.source, error = %e, "Image fetch failed"),
        }
        deliver(waiters, &result);
        self.pump();
    }

    fn spawn_durable_write(
        &self,
        namespace: Namespace,
        source: SourceId,
        image: EncodedImage,
        generation: Generation,
    ) {
        let loader = self.clone();
        tokio::spawn(async move {
            if loader.current_generation() != generation {
                return;
            }
            loader.inner.store.put(namespace, &source, &image).await;
        });
    }

    fn spawn_thumbnail(&self, source: SourceId, image: EncodedImage, generation: Generation) {
        let loader = self.clone();
        tokio::spawn(async move {
            match loader.inner.deriver.derive_async(image).await {
                Ok(thumb) => {
                    if loader.current_generation() != generation {
                        trace!(source = %source, "Dropping thumbnail from cancelled generation");
                        return;
                    }
                    loader.inner.thumbnails.put(source.clone(), thumb.clone());
                    loader
                        .inner
                        .store
                        .put(Namespace::Thumbnail, &source, &thumb)
                        .await;
                }
                Err(e) => {
                    debug!(source = %source, error = %e, "Thumbnail derivation failed");
                }
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::domain::errors::StoreResult;
    use crate::domain::ports::{DurableBackend, RecencyEntry, StoredRecord};
    use crate::infrastructure::image::DurableStoreConfig;
    use crate::infrastructure::storage::MemoryBackend;

    /// In-memory backend whose reads take `delay`.
    pub struct SlowBackend {
        inner: MemoryBackend,
        delay: Duration,
    }

    impl SlowBackend {
        pub fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryBackend::new(),
                delay,
            }
        }
    }

    #[async_trait]
    impl DurableBackend for SlowBackend {
        async fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(key).await
        }

        async fn put(&self, record: StoredRecord) -> StoreResult<()> {
            self.inner.put(record).await
        }

        async fn count(&self, prefix: &str) -> StoreResult<usize> {
            self.inner.count(prefix).await
        }

        async fn oldest(&self, prefix: &str, limit: usize) -> StoreResult<Vec<RecencyEntry>> {
            self.inner.oldest(prefix, limit).await
        }

        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.inner.delete(key).await
        }

        async fn clear(&self) -> StoreResult<()> {
            self.inner.clear().await
        }
    }

    pub fn loader_with(fetcher: Arc<dyn ImageFetcher>, max_concurrent: usize) -> ImageLoader {
        loader_on(Arc::new(MemoryBackend::new()), fetcher, max_concurrent)
    }

    pub fn loader_on(
        backend: Arc<dyn DurableBackend>,
        fetcher: Arc<dyn ImageFetcher>,
        max_concurrent: usize,
    ) -> ImageLoader {
        let store = Arc::new(DurableStore::new(backend, DurableStoreConfig::default()));
        ImageLoader::new(
            ImageLoaderConfig {
                max_concurrent,
                ..ImageLoaderConfig::default()
            },
            fetcher,
            store,
            ThumbnailDeriver::default(),
        )
    }

    /// Polls `cond` until it holds, failing the test after ~2s.
    pub async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached in time");
    }

    pub fn png_bytes(width: u32, height: u32) -> EncodedImage {
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("png encoding");
        EncodedImage::from(out.into_inner())
    }
}
