//! Wires the pipeline's adapters together from a [`PipelineConfig`].

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing::info;

use crate::application::{BulkThumbnailService, EscalationService};
use crate::domain::ports::{BatchDownloadPort, BatchOptions, DurableBackend, ImageProxyPort};

use super::config::PipelineConfig;
use super::http::batch_downloader::DEFAULT_BATCH_CONCURRENCY;
use super::http::{HttpBatchDownloader, HttpImageFetcher, HttpProxy};
use super::image::{DurableStore, ImageLoader, Prefetcher};
use super::storage::FileBackend;

/// The assembled loader plus the services built on top of it.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    loader: ImageLoader,
    batch: Arc<HttpBatchDownloader>,
    network_proxy: Arc<HttpProxy>,
}

impl Pipeline {
    /// Opens the durable store and builds the HTTP adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if no store directory can be determined, the store
    /// cannot be opened, or an HTTP client cannot be created.
    pub async fn build(config: PipelineConfig) -> Result<Self> {
        let store_dir = config
            .effective_store_dir()
            .ok_or_else(|| eyre!("Failed to determine durable store directory"))?;
        let backend: Arc<dyn DurableBackend> = Arc::new(
            FileBackend::open(&store_dir)
                .await
                .wrap_err("Failed to open durable store")?,
        );

        let fetcher = HttpImageFetcher::new(config.request_timeout(), &config.loader.user_agent)
            .wrap_err("Failed to create image fetcher")?;
        let store = Arc::new(DurableStore::new(backend, config.store_config()));
        let loader = ImageLoader::new(
            config.loader_config(),
            Arc::new(fetcher),
            store,
            config.thumbnail_deriver(),
        );

        let download_dir = PipelineConfig::default_download_dir()
            .unwrap_or_else(|| store_dir.join("prefetch"));
        let batch = HttpBatchDownloader::new(
            config.request_timeout(),
            &config.loader.user_agent,
            download_dir,
            DEFAULT_BATCH_CONCURRENCY,
        )
        .wrap_err("Failed to create batch downloader")?;
        let network_proxy =
            HttpProxy::new(config.request_timeout()).wrap_err("Failed to create network proxy")?;

        info!(
            store = %store_dir.display(),
            max_concurrent = config.loader.max_concurrent,
            "Pipeline assembled"
        );

        Ok(Self {
            config,
            loader,
            batch: Arc::new(batch),
            network_proxy: Arc::new(network_proxy),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    /// Prefetcher writing full-size files into `output_dir`, or the batch
    /// downloader's default directory.
    #[must_use]
    pub fn prefetcher(&self, output_dir: Option<PathBuf>) -> Prefetcher {
        Prefetcher::new(
            Arc::clone(&self.batch) as Arc<dyn BatchDownloadPort>,
            self.config.prefetch.radius,
            BatchOptions {
                output_dir,
                max_edge: None,
                return_payload: false,
            },
        )
    }

    #[must_use]
    pub fn bulk_thumbnails(&self) -> BulkThumbnailService {
        BulkThumbnailService::new(
            self.loader.clone(),
            Arc::clone(&self.batch) as Arc<dyn BatchDownloadPort>,
            self.config.thumbnail.max_edge,
        )
    }

    /// Escalation chain ending in the host's browser-context proxy.
    #[must_use]
    pub fn escalation(&self, browser_proxy: Arc<dyn ImageProxyPort>) -> EscalationService {
        EscalationService::new(
            self.loader.clone(),
            Arc::clone(&self.network_proxy) as Arc<dyn ImageProxyPort>,
            browser_proxy,
        )
        .with_direct_timeout(self.config.direct_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EncodedImage, Priority, SourceId};
    use crate::domain::errors::LoadError;
    use crate::domain::ports::mocks::{CallLog, MockProxy};

    async fn pipeline_in(dir: &std::path::Path) -> Pipeline {
        let mut config = PipelineConfig::default();
        config.store.directory = Some(dir.to_path_buf());
        config.escalation.direct_timeout_ms = 200;
        Pipeline::build(config).await.expect("pipeline")
    }

    #[tokio::test]
    async fn test_build_uses_configured_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path()).await;
        let source = SourceId::new("https://x/a.jpg");

        pipeline
            .loader()
            .store(source.clone(), EncodedImage::from(vec![1, 2, 3]));

        assert_eq!(
            pipeline.loader().get_cached(&source),
            Some(EncodedImage::from(vec![1, 2, 3]))
        );
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_local_descriptor_escalates_to_browser_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path()).await;
        let browser = Arc::new(MockProxy::succeeding(
            "browser",
            EncodedImage::from(vec![9]),
            CallLog::default(),
        ));

        let resolved = pipeline
            .escalation(browser)
            .resolve(SourceId::new("/local/a.jpg"), Priority::High)
            .await;

        assert_eq!(resolved.map(|r| r.image), Ok(EncodedImage::from(vec![9])));
    }

    #[tokio::test]
    async fn test_local_descriptor_without_proxies_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path()).await;
        let browser = Arc::new(MockProxy::failing("browser", CallLog::default()));

        let result = pipeline
            .escalation(browser)
            .load(SourceId::new("/local/b.jpg"), Priority::Normal)
            .await;

        assert!(matches!(result, Err(LoadError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_prefetcher_uses_configured_radius() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path()).await;

        let prefetcher = pipeline.prefetcher(None);

        assert_eq!(prefetcher.window_bounds(100, 50), Some(40..=60));
    }
}
