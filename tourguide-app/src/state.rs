//! Host application state.
//!
//! `AppState` owns the loaded settings and turns them into the core's
//! configuration types, so command handlers never read raw settings fields.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tourguide_core::{
    AssetCache, AudioBackend, CacheConfig, ChunkOptions, PlayerConfig, SanitizeOptions,
    StubBackend, StubConfig,
};
use tracing::info;

use crate::settings::{load_settings, AppSettings};

/// Shared application state, available to every command handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Normalized settings, CLI overrides already applied.
    pub settings: AppSettings,
    /// Absolute path to `settings.json`.
    pub settings_path: PathBuf,
}

impl AppState {
    pub fn load(settings_path: PathBuf) -> Self {
        let settings = load_settings(&settings_path);
        info!(path = %settings_path.display(), "settings loaded");
        Self {
            settings,
            settings_path,
        }
    }

    pub fn chunk_options(&self) -> ChunkOptions {
        let s = &self.settings;
        ChunkOptions {
            min_chars: s.chunk_min_chars,
            max_chars: s.chunk_max_chars,
            min_words: s.chunk_min_words,
            max_words: s.chunk_max_words,
        }
        .for_provider_limit(s.provider_char_limit)
    }

    pub fn sanitize_options(&self) -> SanitizeOptions {
        SanitizeOptions {
            max_length: Some(self.settings.sanitize_max_length),
            strip_sql_keywords: self.settings.strip_sql_keywords,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        let dir = self
            .settings
            .cache_dir
            .clone()
            .unwrap_or_else(CacheConfig::default_dir);
        CacheConfig {
            fetch_attempts: self.settings.fetch_attempts,
            ..CacheConfig::new(dir)
        }
    }

    /// HTTP-backed asset cache, or `None` when caching is disabled.
    pub fn cache(&self) -> anyhow::Result<Option<Arc<AssetCache>>> {
        if !self.settings.cache_enabled {
            return Ok(None);
        }
        let cache = AssetCache::with_http(self.cache_config()).context("creating asset cache")?;
        Ok(Some(Arc::new(cache)))
    }

    pub fn player_config(&self, resume_position_ms: u64) -> PlayerConfig {
        PlayerConfig {
            skip_interval: Duration::from_secs(self.settings.skip_seconds),
            resume_position_ms,
            ..PlayerConfig::default()
        }
    }

    pub fn backend(&self) -> Arc<dyn AudioBackend> {
        Arc::new(StubBackend::new(StubConfig {
            tick: Duration::from_millis(self.settings.stub_tick_ms),
            speedup: self.settings.stub_speedup,
            ..StubConfig::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(settings: AppSettings) -> AppState {
        AppState {
            settings,
            settings_path: PathBuf::from("settings.json"),
        }
    }

    #[test]
    fn chunk_options_follow_settings() {
        let app = state(AppSettings {
            chunk_min_chars: 50,
            chunk_max_chars: 120,
            chunk_max_words: Some(20),
            ..AppSettings::default()
        });
        let opts = app.chunk_options();
        assert_eq!(opts.min_chars, 50);
        assert_eq!(opts.max_chars, 120);
        assert_eq!(opts.max_words, Some(20));
    }

    #[test]
    fn cache_disabled_yields_none() {
        let app = state(AppSettings {
            cache_enabled: false,
            ..AppSettings::default()
        });
        assert!(app.cache().expect("cache").is_none());
    }

    #[test]
    fn cache_dir_override_is_used() {
        let app = state(AppSettings {
            cache_dir: Some(PathBuf::from("/tmp/tours")),
            fetch_attempts: 4,
            ..AppSettings::default()
        });
        let config = app.cache_config();
        assert_eq!(config.dir, PathBuf::from("/tmp/tours"));
        assert_eq!(config.fetch_attempts, 4);
    }
}
