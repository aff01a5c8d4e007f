//! Thumbnail derivation.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, error};

use crate::domain::entities::EncodedImage;
use crate::domain::errors::{LoadError, LoadResult};

/// Default bound of the longer thumbnail edge, in pixels.
pub const DEFAULT_MAX_EDGE: u32 = 256;

/// Default JPEG quality (0-100).
pub const DEFAULT_QUALITY: u8 = 70;

/// Downsamples encoded images into small JPEG thumbnails.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailDeriver {
    max_edge: u32,
    quality: u8,
}

impl Default for ThumbnailDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EDGE, DEFAULT_QUALITY)
    }
}

impl ThumbnailDeriver {
    #[must_use]
    pub fn new(max_edge: u32, quality: u8) -> Self {
        Self {
            max_edge: max_edge.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    #[must_use]
    pub const fn max_edge(&self) -> u32 {
        self.max_edge
    }

    /// Decodes `source`, scales it so the longer edge fits `max_edge`
    /// (never upscaling) and re-encodes it as JPEG.
    ///
    /// # Errors
    /// Returns [`LoadError::Decode`] if the payload cannot be decoded or
    /// encoded.
    pub fn derive(&self, source: &EncodedImage) -> LoadResult<EncodedImage> {
        let decoded = image::load_from_memory(source.as_bytes())
            .map_err(|e| LoadError::decode(format!("failed to decode image: {e}")))?;

        let scaled = if decoded.width().max(decoded.height()) > self.max_edge {
            decoded.thumbnail(self.max_edge, self.max_edge)
        } else {
            decoded
        };

        let rgb = scaled.into_rgb8();
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&rgb)
            .map_err(|e| LoadError::decode(format!("failed to encode thumbnail: {e}")))?;

        let bytes = out.into_inner();
        debug!(
            width = rgb.width(),
            height = rgb.height(),
            size = bytes.len(),
            "Derived thumbnail"
        );
        Ok(EncodedImage::from(bytes))
    }

    /// Runs [`Self::derive`] on the blocking pool.
    ///
    /// # Errors
    /// Same as [`Self::derive`], plus a decode error if the task panics.
    pub async fn derive_async(&self, source: EncodedImage) -> LoadResult<EncodedImage> {
        let deriver = *self;
        tokio::task::spawn_blocking(move || deriver.derive(&source))
            .await
            .map_err(|e| {
                error!(error = %e, "Thumbnail task panicked");
                LoadError::decode(format!("thumbnail task panicked: {e}"))
            })?
    }
}
