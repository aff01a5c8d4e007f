//! reqwest-backed image transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{trace, warn};

use crate::domain::entities::{EncodedImage, SourceId};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::ImageFetcher;

/// Default user agent for direct fetches.
pub const DEFAULT_USER_AGENT: &str = concat!("pixelpipe/", env!("CARGO_PKG_VERSION"));

/// Builds the shared HTTP client.
///
/// # Errors
/// Returns error if the TLS backend cannot be initialized.
pub fn build_client(timeout: Duration, user_agent: &str) -> LoadResult<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| LoadError::network(format!("failed to create HTTP client: {e}")))
}

/// Downloads the body of `source`, optionally sending a referer.
pub(super) async fn download(
    client: &Client,
    source: &SourceId,
    referer: Option<&str>,
) -> LoadResult<EncodedImage> {
    if !source.is_network_addressable() {
        return Err(LoadError::network(format!(
            "{source} is not network-addressable"
        )));
    }

    let mut request = client
        .get(source.as_str())
        .header(header::ACCEPT, "image/avif,image/webp,image/png,image/*;q=0.8,*/*;q=0.5");
    if let Some(referer) = referer {
        request = request.header(header::REFERER, referer);
    }

    let response = request.send().await.map_err(|e| {
        warn!(source = %source, error = %e, "Image request failed");
        if e.is_timeout() {
            LoadError::network("request timed out")
        } else if e.is_connect() {
            LoadError::network(format!("failed to connect: {e}"))
        } else {
            LoadError::network(format!("request failed: {e}"))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::network(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| LoadError::network(format!("failed to read body: {e}")))?;

    trace!(source = %source, size = bytes.len(), "Downloaded image body");
    Ok(EncodedImage::new(bytes))
}

/// Direct network fetcher used by the scheduler.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// Creates a fetcher with its own client.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(timeout: Duration, user_agent: &str) -> LoadResult<Self> {
        Ok(Self {
            client: build_client(timeout, user_agent)?,
        })
    }

    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, source: &SourceId) -> LoadResult<EncodedImage> {
        download(&self.client, source, None).await
    }
}
