//! In-memory LRU image cache implementation.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{EncodedImage, SourceId};

/// Default capacity of the full-size tier.
pub const DEFAULT_FULL_CAPACITY: usize = 50;

/// Default capacity of the thumbnail tier.
pub const DEFAULT_THUMBNAIL_CAPACITY: usize = 200;

/// Bounded LRU cache of encoded images.
///
/// Synchronous so callers get same-tick access to already-seen images; the
/// lock is never held across an await point.
pub struct MemoryImageCache {
    name: &'static str,
    cache: Mutex<LruCache<SourceId, EncodedImage>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a cache holding at most `capacity` images (minimum 1).
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            cache: Mutex::new(LruCache::new(cap)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the image and promotes it to most-recently-used.
    pub fn get(&self, id: &SourceId) -> Option<EncodedImage> {
        let mut cache = self.cache.lock();
        if let Some(img) = cache.get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(cache = self.name, source = %id, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(cache = self.name, source = %id, "Memory cache miss");
            None
        }
    }

    /// Peeks at an image without promoting it.
    pub fn peek(&self, id: &SourceId) -> Option<EncodedImage> {
        self.cache.lock().peek(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &SourceId) -> bool {
        self.cache.lock().contains(id)
    }

    /// Inserts or overwrites an entry, evicting the least-recently-used one
    /// when the cache is full. Returns the evicted key.
    pub fn put(&self, id: SourceId, image: EncodedImage) -> Option<SourceId> {
        let mut cache = self.cache.lock();
        let inserted = id.clone();
        match cache.push(id, image) {
            Some((evicted, _)) if evicted != inserted => {
                debug!(cache = self.name, evicted = %evicted, "Evicted least recently used image");
                Some(evicted)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
        debug!(cache = self.name, "Cleared memory image cache");
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: self.len(),
        }
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(byte: u8) -> EncodedImage {
        EncodedImage::from(vec![byte])
    }

    #[test]
    fn test_put_and_get() {
        let cache = MemoryImageCache::new("full", 10);
        let id = SourceId::new("https://x/1.png");

        cache.put(id.clone(), img(1));

        assert_eq!(cache.get(&id), Some(img(1)));
        assert!(cache.get(&SourceId::new("missing")).is_none());
    }

    #[test]
    fn test_overflow_evicts_least_recently_used() {
        let cache = MemoryImageCache::new("full", 3);
        for i in 0..3u8 {
            cache.put(SourceId::new(format!("k{i}")), img(i));
        }

        let evicted = cache.put(SourceId::new("k3"), img(3));

        assert_eq!(evicted, Some(SourceId::new("k0")));
        assert_eq!(cache.len(), 3);
        assert!(cache.peek(&SourceId::new("k0")).is_none());
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let cache = MemoryImageCache::new("full", 3);
        for i in 0..3u8 {
            cache.put(SourceId::new(format!("k{i}")), img(i));
        }

        assert!(cache.get(&SourceId::new("k0")).is_some());
        let evicted = cache.put(SourceId::new("k3"), img(3));

        assert_eq!(evicted, Some(SourceId::new("k1")));
        assert!(cache.contains(&SourceId::new("k0")));
    }

    #[test]
    fn test_overwrite_is_not_eviction() {
        let cache = MemoryImageCache::new("full", 2);
        let id = SourceId::new("k");
        cache.put(id.clone(), img(1));

        assert_eq!(cache.put(id.clone(), img(2)), None);
        assert_eq!(cache.peek(&id), Some(img(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new("full", 2);
        cache.put(SourceId::new("a"), img(1));
        cache.put(SourceId::new("b"), img(2));

        let _ = cache.peek(&SourceId::new("a"));
        cache.put(SourceId::new("c"), img(3));

        assert!(cache.peek(&SourceId::new("a")).is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = MemoryImageCache::new("thumbnail", 0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_stats() {
        let cache = MemoryImageCache::new("full", 10);
        let id = SourceId::new("k");
        cache.put(id.clone(), img(1));

        let _ = cache.get(&id);
        let _ = cache.get(&SourceId::new("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!(stats.to_string().contains("50.0% hit rate"));
    }
}
