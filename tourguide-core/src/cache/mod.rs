//! On-disk cache for remote segment audio.
//!
//! Remote assets are stored under the cache directory as
//! `<sha256(uri) hex>.<original extension>`. Resolution never fails: any
//! problem (directory creation, download, write) is logged and the remote URI
//! is streamed directly instead.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpFetcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::audio::{is_remote, AudioSource};
use crate::error::{Result, TourError};
use crate::guide::AudioSegment;

/// Download contract: GET the bytes at `url`, or fail.
#[async_trait]
pub trait AssetFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Configuration for `AssetCache`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Download attempts per asset, at least 1. Default: 2.
    pub fetch_attempts: u32,
    /// Pause between attempts. Default: 250 ms.
    pub retry_delay: Duration,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Platform cache directory, e.g. `~/.cache/tourguide/audio` on Linux.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tourguide")
            .join("audio")
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            fetch_attempts: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Summary of a `prefetch` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Remote assets now present on disk (downloaded or already cached).
    pub cached: usize,
    /// Remote assets that could not be stored.
    pub failed: usize,
    /// Local or empty URIs, left untouched.
    pub skipped: usize,
}

pub struct AssetCache {
    config: CacheConfig,
    fetcher: Arc<dyn AssetFetcher>,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AssetCache {
    pub fn new(config: CacheConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Cache backed by `HttpFetcher`.
    #[cfg(feature = "http")]
    pub fn with_http(config: CacheConfig) -> Result<Self> {
        Ok(Self::new(config, Arc::new(HttpFetcher::new()?)))
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Where `uri` is (or would be) stored. `None` for non-remote URIs.
    pub fn cached_path(&self, uri: &str) -> Option<PathBuf> {
        is_remote(uri).then(|| self.config.dir.join(cache_file_name(uri)))
    }

    /// `true` when a non-empty cached copy of `uri` exists.
    pub async fn is_cached(&self, uri: &str) -> bool {
        match self.cached_path(uri) {
            Some(path) => is_non_empty_file(&path).await,
            None => false,
        }
    }

    /// Map a segment URI to something the backend can open.
    ///
    /// Local URIs pass through. Remote URIs resolve to the cached file,
    /// downloading it first when absent; on failure the remote URI is
    /// returned for streaming.
    pub async fn resolve(&self, uri: &str) -> AudioSource {
        let Some(path) = self.cached_path(uri) else {
            return AudioSource::from_uri(uri);
        };

        if is_non_empty_file(&path).await {
            debug!(uri, path = %path.display(), "cache hit");
            return AudioSource::Local(path);
        }

        match self.store(uri, &path).await {
            Ok(()) => AudioSource::Local(path),
            Err(e) => {
                warn!(uri, "caching failed, streaming instead: {e}");
                AudioSource::Remote(uri.to_string())
            }
        }
    }

    /// Warm the cache for every remote segment.
    pub async fn prefetch(&self, segments: &[AudioSegment]) -> PrefetchReport {
        let mut report = PrefetchReport::default();
        for segment in segments {
            if !segment.has_uri() || !is_remote(&segment.uri) {
                report.skipped += 1;
                continue;
            }
            match self.resolve(&segment.uri).await {
                AudioSource::Local(_) => report.cached += 1,
                AudioSource::Remote(_) => report.failed += 1,
            }
        }
        info!(
            cached = report.cached,
            failed = report.failed,
            skipped = report.skipped,
            "prefetch complete"
        );
        report
    }

    /// Delete every cached asset. Returns the number of files removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.config.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        info!(removed, dir = %self.config.dir.display(), "cache cleared");
        Ok(removed)
    }

    async fn store(&self, uri: &str, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.dir).await?;

        let bytes = self.fetch_with_retry(uri).await?;
        if bytes.is_empty() {
            return Err(TourError::Fetch(format!("empty response for {uri}")));
        }

        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        info!(uri, path = %path.display(), bytes = bytes.len(), "asset cached");
        Ok(())
    }

    async fn fetch_with_retry(&self, uri: &str) -> Result<Vec<u8>> {
        let attempts = self.config.fetch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(uri).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < attempts => {
                    debug!(uri, attempt, "fetch failed, retrying: {e}");
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `sha256(uri)` hex, plus the URI path's extension when it has one.
pub fn cache_file_name(uri: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(uri.as_bytes()));
    match uri_extension(uri) {
        Some(ext) => format!("{digest}.{ext}"),
        None => digest,
    }
}

fn uri_extension(uri: &str) -> Option<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    let valid = !stem.is_empty()
        && !ext.is_empty()
        && ext.len() <= 5
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

async fn is_non_empty_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}
