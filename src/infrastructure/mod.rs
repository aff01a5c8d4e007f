//! Infrastructure layer with caching, storage and network adapters.

/// Pipeline configuration.
pub mod config;
/// HTTP fetcher, proxy and batch downloader.
pub mod http;
/// Image caching, scheduling and prefetching.
pub mod image;
/// Tracing subscriber setup.
pub mod logging;
/// Composition of the adapters.
pub mod pipeline;
/// Durable backends.
pub mod storage;

pub use config::{CliArgs, LogLevel, PipelineConfig};
pub use http::{HttpBatchDownloader, HttpImageFetcher, HttpProxy};
pub use image::{
    CacheStats, DurableStore, DurableStoreConfig, ImageLoader, ImageLoaderConfig,
    MemoryImageCache, PendingLoad, PrefetchOutcome, Prefetcher, ThumbnailDeriver,
};
pub use logging::init_logging;
pub use pipeline::Pipeline;
pub use storage::{FileBackend, MemoryBackend};
