//! HTTP adapters for the fetcher, proxy and batch ports.

pub mod batch_downloader;
pub mod fetcher;
pub mod proxy;

pub use batch_downloader::HttpBatchDownloader;
pub use fetcher::{DEFAULT_USER_AGENT, HttpImageFetcher, build_client};
pub use proxy::HttpProxy;
