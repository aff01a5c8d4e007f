//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheEntry, EncodedImage, Generation, Namespace, Priority, SourceId};
pub use errors::{LoadError, LoadResult, StoreError, StoreResult};
pub use ports::{BatchDownloadPort, DurableBackend, ImageFetcher, ImageProxyPort};
