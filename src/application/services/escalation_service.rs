//! Layered fallback for images that fail to load directly.
//!
//! Direct load through the scheduler, then the network proxy, then the
//! browser-context proxy. The direct attempt races a fixed timeout; whichever
//! settles first decides the transition and the loser is dropped, so each
//! layer is attempted at most once per call. A cancellation anywhere stops
//! the chain.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::entities::{EncodedImage, Generation, Priority, SourceId};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::ImageProxyPort;
use crate::infrastructure::image::ImageLoader;

/// Default time the direct attempt gets before escalating.
pub const DEFAULT_DIRECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Layer of the chain that produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Direct,
    NetworkProxy,
    BrowserProxy,
}

impl std::fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::NetworkProxy => write!(f, "network-proxy"),
            Self::BrowserProxy => write!(f, "browser-proxy"),
        }
    }
}

/// An image together with the layer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub image: EncodedImage,
    pub resolved_by: ResolvedBy,
}

/// Applies the escalation chain on top of an [`ImageLoader`].
pub struct EscalationService {
    loader: ImageLoader,
    network_proxy: Arc<dyn ImageProxyPort>,
    browser_proxy: Arc<dyn ImageProxyPort>,
    direct_timeout: Duration,
}

impl std::fmt::Debug for EscalationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationService")
            .field("network_proxy", &self.network_proxy.name())
            .field("browser_proxy", &self.browser_proxy.name())
            .field("direct_timeout", &self.direct_timeout)
            .finish_non_exhaustive()
    }
}

impl EscalationService {
    #[must_use]
    pub fn new(
        loader: ImageLoader,
        network_proxy: Arc<dyn ImageProxyPort>,
        browser_proxy: Arc<dyn ImageProxyPort>,
    ) -> Self {
        Self {
            loader,
            network_proxy,
            browser_proxy,
            direct_timeout: DEFAULT_DIRECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_direct_timeout(mut self, timeout: Duration) -> Self {
        self.direct_timeout = timeout;
        self
    }

    /// Loads `source`, escalating through the proxies if needed.
    ///
    /// # Errors
    /// Returns [`LoadError::Abort`] if the load was cancelled and
    /// [`LoadError::Unavailable`] if every layer failed.
    pub async fn load(&self, source: SourceId, priority: Priority) -> LoadResult<EncodedImage> {
        self.resolve(source, priority).await.map(|r| r.image)
    }

    /// Like [`Self::load`], also reporting which layer succeeded.
    ///
    /// # Errors
    /// Same as [`Self::load`].
    pub async fn resolve(&self, source: SourceId, priority: Priority) -> LoadResult<Resolved> {
        let generation = self.loader.current_generation();
        let direct = self.loader.request(source.clone(), priority);

        let mut last_error = match tokio::time::timeout(self.direct_timeout, direct).await {
            Ok(Ok(image)) => {
                return Ok(Resolved {
                    image,
                    resolved_by: ResolvedBy::Direct,
                });
            }
            Ok(Err(e)) if e.is_abort() => return Err(e),
            Ok(Err(e)) => {
                debug!(source = %source, error = %e, "Direct load failed");
                e.to_string()
            }
            Err(_) => {
                debug!(
                    source = %source,
                    timeout_ms = self.direct_timeout.as_millis(),
                    "Direct load timed out"
                );
                format!(
                    "direct load timed out after {}ms",
                    self.direct_timeout.as_millis()
                )
            }
        };

        let layers = [
            (ResolvedBy::NetworkProxy, &self.network_proxy),
            (ResolvedBy::BrowserProxy, &self.browser_proxy),
        ];

        for (layer, proxy) in layers {
            self.ensure_current(generation)?;
            info!(source = %source, layer = %layer, proxy = proxy.name(), "Escalating image load");

            match proxy.proxy(&source).await {
                Ok(image) => {
                    self.ensure_current(generation)?;
                    self.loader.store(source.clone(), image.clone());
                    info!(source = %source, layer = %layer, "Image resolved through proxy");
                    return Ok(Resolved {
                        image,
                        resolved_by: layer,
                    });
                }
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => {
                    warn!(source = %source, layer = %layer, error = %e, "Proxy layer failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(LoadError::unavailable(source.as_str(), last_error))
    }

    fn ensure_current(&self, generation: Generation) -> LoadResult<()> {
        if self.loader.current_generation() == generation {
            Ok(())
        } else {
            Err(LoadError::Abort)
        }
    }
}
