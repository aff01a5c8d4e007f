//! Source identifiers and load priorities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical key under which an image is fetched and cached.
///
/// Usually a remote URL, but local descriptors are accepted as well; only
/// network-addressable identifiers can be handed to the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a source identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is an `http(s)` URL.
    #[must_use]
    pub fn is_network_addressable(&self) -> bool {
        let lower = self.0.trim_start().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Returns the `scheme://host` prefix of a URL identifier.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        let scheme_end = self.0.find("://")?;
        let rest = &self.0[scheme_end + 3..];
        let host_end = rest.find('/').map_or(self.0.len(), |i| scheme_end + 3 + i);
        Some(&self.0[..host_end])
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Scheduling priority of a load request.
///
/// Ordering follows the numeric value: `High` sorts before `Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Visible content.
    High = 0,
    /// Default priority.
    #[default]
    Normal = 1,
    /// Background prefetch.
    Low = 2,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}
