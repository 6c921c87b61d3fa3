//! `HttpFetcher`: `reqwest` implementation of `AssetFetcher`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::AssetFetcher;
use crate::error::{Result, TourError};

/// Per-request ceiling for one asset download.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TourError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TourError::Fetch(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TourError::Fetch(format!("{url} returned status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TourError::Fetch(format!("reading body of {url} failed: {e}")))?;
        debug!(url, bytes = bytes.len(), "asset downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::audio::AudioSource;
    use crate::cache::{AssetCache, CacheConfig};

    /// Nothing listens on port 1, so every request is refused locally.
    const DEAD_URL: &str = "http://127.0.0.1:1/tours/harbour.mp3";

    fn local_only() -> HttpFetcher {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("client");
        HttpFetcher::with_client(client)
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_error() {
        let err = local_only().fetch(DEAD_URL).await.expect_err("refused");
        assert!(matches!(err, TourError::Fetch(ref msg) if msg.contains(DEAD_URL)));
    }

    #[tokio::test]
    async fn cache_streams_when_http_fetch_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = AssetCache::new(
            CacheConfig {
                dir: dir.path().to_path_buf(),
                fetch_attempts: 1,
                retry_delay: Duration::from_millis(1),
            },
            Arc::new(local_only()),
        );

        assert_eq!(
            cache.resolve(DEAD_URL).await,
            AudioSource::Remote(DEAD_URL.to_string())
        );
        assert!(!cache.is_cached(DEAD_URL).await);
    }
}
