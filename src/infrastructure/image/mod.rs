//! Image caching and loading.
//!
//! This module provides:
//! - Bounded in-memory LRU tiers for full images and thumbnails
//! - A durable, namespaced store with age expiry and batched eviction
//! - The prioritized, deduplicating load scheduler
//! - Thumbnail derivation and window prefetching

pub mod durable_store;
pub mod loader;
pub mod memory_cache;
pub mod prefetcher;
pub mod thumbnail;

pub use durable_store::{DurableStore, DurableStoreConfig};
pub use loader::{ImageLoader, ImageLoaderConfig, PendingLoad};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use prefetcher::{PrefetchOutcome, Prefetcher};
pub use thumbnail::ThumbnailDeriver;
