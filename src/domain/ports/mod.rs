mod batch_download_port;
mod durable_backend_port;
mod image_fetcher_port;
mod image_proxy_port;

pub use batch_download_port::{
    BatchDownloadPort, BatchEvent, BatchItem, BatchItemOutcome, BatchOptions, BatchRequest,
    BatchSummary,
};
pub use durable_backend_port::{DurableBackend, RecencyEntry, StoredRecord};
pub use image_fetcher_port::ImageFetcher;
pub use image_proxy_port::ImageProxyPort;
