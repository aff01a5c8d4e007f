//! In-process network proxy: the second escalation layer.
//!
//! Refetches with browser-like headers and the source's origin as referer,
//! which is enough for hosts that only reject hotlinked or headless requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::domain::entities::{EncodedImage, SourceId};
use crate::domain::errors::LoadResult;
use crate::domain::ports::ImageProxyPort;

use super::fetcher::{build_client, download};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// reqwest-backed [`ImageProxyPort`].
#[derive(Debug, Clone)]
pub struct HttpProxy {
    client: Client,
}

impl HttpProxy {
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(timeout: Duration) -> LoadResult<Self> {
        Ok(Self {
            client: build_client(timeout, BROWSER_USER_AGENT)?,
        })
    }
}

/// Referer sent for a source: its origin with a trailing slash.
fn referer_for(source: &SourceId) -> Option<String> {
    source.origin().map(|origin| format!("{origin}/"))
}

#[async_trait]
impl ImageProxyPort for HttpProxy {
    fn name(&self) -> &'static str {
        "network-proxy"
    }

    async fn proxy(&self, source: &SourceId) -> LoadResult<EncodedImage> {
        let referer = referer_for(source);
        debug!(source = %source, referer = ?referer, "Proxying image request");
        download(&self.client, source, referer.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referer_is_origin() {
        assert_eq!(
            referer_for(&SourceId::new("https://cdn.example.com/a/b.jpg")),
            Some("https://cdn.example.com/".to_string())
        );
        assert_eq!(referer_for(&SourceId::new("relative/path.jpg")), None);
    }
}
