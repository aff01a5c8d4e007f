//! Port definition for proxy collaborators used by the escalation chain.

use async_trait::async_trait;

use crate::domain::entities::{EncodedImage, SourceId};
use crate::domain::errors::LoadResult;

/// A collaborator that loads an image on the caller's behalf.
///
/// Two layers implement this: an in-process network proxy and a hidden
/// browser context that loads the referring page.
#[async_trait]
pub trait ImageProxyPort: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetches `source` through the proxy.
    async fn proxy(&self, source: &SourceId) -> LoadResult<EncodedImage>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::domain::errors::LoadError;

    /// Shared log of `(proxy name, event)` pairs across several mocks.
    pub type CallLog = Arc<Mutex<Vec<String>>>;

    /// Proxy returning a fixed response and appending to a shared log.
    pub struct MockProxy {
        name: &'static str,
        response: LoadResult<EncodedImage>,
        delay: Option<Duration>,
        log: CallLog,
    }

    impl MockProxy {
        pub fn succeeding(name: &'static str, payload: EncodedImage, log: CallLog) -> Self {
            Self {
                name,
                response: Ok(payload),
                delay: None,
                log,
            }
        }

        pub fn failing(name: &'static str, log: CallLog) -> Self {
            Self {
                name,
                response: Err(LoadError::network(format!("{name} refused"))),
                delay: None,
                log,
            }
        }

        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl ImageProxyPort for MockProxy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn proxy(&self, _source: &SourceId) -> LoadResult<EncodedImage> {
            self.log.lock().push(format!("{}:start", self.name));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.log.lock().push(format!("{}:end", self.name));
            self.response.clone()
        }
    }
}
