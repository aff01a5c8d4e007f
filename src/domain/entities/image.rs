//! Encoded image payloads and cache entries.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use super::SourceId;

/// Immutable encoded image bytes (PNG, JPEG, WebP...).
///
/// Cloning is cheap; every cache tier and every waiter shares the same buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedImage(Bytes);

impl EncodedImage {
    /// Wraps raw encoded bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Guesses the container format from the magic bytes.
    #[must_use]
    pub fn format(&self) -> Option<image::ImageFormat> {
        image::guess_format(&self.0).ok()
    }

    /// Encodes the payload as a portable base64 string.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Decodes a payload previously produced by [`Self::to_base64`].
    ///
    /// # Errors
    /// Returns the decoder error if the string is not valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded).map(|raw| Self(Bytes::from(raw)))
    }
}

impl From<Vec<u8>> for EncodedImage {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for EncodedImage {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

/// Logical partition of the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Full-size images.
    Full,
    /// Derived thumbnails.
    Thumbnail,
}

impl Namespace {
    /// Key prefix shared by every entry of the namespace.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Full => "full:",
            Self::Thumbnail => "thumb:",
        }
    }

    /// Physical store key for a source.
    #[must_use]
    pub fn key(self, source: &SourceId) -> String {
        format!("{}{}", self.prefix(), source.as_str())
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

/// A payload held by a cache tier together with the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Physical key (namespace prefix + source identifier).
    pub key: String,
    /// Encoded image bytes.
    pub payload: EncodedImage,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, payload: EncodedImage, stored_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            payload,
            stored_at,
        }
    }

    /// Age of the entry relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.stored_at
    }

    /// Returns true if the entry is older than `max_age`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        self.age(now) > max_age
    }
}
