//! Domain entity definitions.

mod generation;
mod image;
mod source;

pub use generation::Generation;
pub use image::{CacheEntry, EncodedImage, Namespace};
pub use source::{Priority, SourceId};
