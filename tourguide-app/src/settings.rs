//! Persistent host settings (JSON file in the platform config directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tourguide_core::text::{DEFAULT_MAX_LENGTH, PROVIDER_CHAR_LIMIT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub chunk_min_chars: usize,
    pub chunk_max_chars: usize,
    pub chunk_min_words: Option<usize>,
    pub chunk_max_words: Option<usize>,
    pub provider_char_limit: usize,
    pub sanitize_max_length: usize,
    pub strip_sql_keywords: bool,
    pub cache_enabled: bool,
    pub cache_dir: Option<PathBuf>,
    pub fetch_attempts: u32,
    pub skip_seconds: u64,
    pub stub_tick_ms: u64,
    pub stub_speedup: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            chunk_min_chars: 200,
            chunk_max_chars: 300,
            chunk_min_words: None,
            chunk_max_words: None,
            provider_char_limit: PROVIDER_CHAR_LIMIT,
            sanitize_max_length: DEFAULT_MAX_LENGTH,
            strip_sql_keywords: true,
            cache_enabled: true,
            cache_dir: None,
            fetch_attempts: 2,
            skip_seconds: 15,
            stub_tick_ms: 100,
            stub_speedup: 1.0,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.provider_char_limit = self.provider_char_limit.clamp(64, 65_536);
        self.chunk_max_chars = self.chunk_max_chars.clamp(1, self.provider_char_limit);
        self.chunk_min_chars = self.chunk_min_chars.min(self.chunk_max_chars);
        self.chunk_min_words = self.chunk_min_words.filter(|w| *w > 0);
        self.chunk_max_words = self.chunk_max_words.filter(|w| *w > 0);
        if let (Some(min), Some(max)) = (self.chunk_min_words, self.chunk_max_words) {
            self.chunk_min_words = Some(min.min(max));
        }
        self.sanitize_max_length = self.sanitize_max_length.clamp(1, 100_000);
        self.cache_dir = self
            .cache_dir
            .take()
            .filter(|dir| !dir.as_os_str().is_empty());
        self.fetch_attempts = self.fetch_attempts.clamp(1, 10);
        self.skip_seconds = self.skip_seconds.clamp(1, 300);
        self.stub_tick_ms = self.stub_tick_ms.clamp(10, 1_000);
        self.stub_speedup = if self.stub_speedup.is_finite() {
            self.stub_speedup.clamp(0.1, 1_000.0)
        } else {
            1.0
        };
    }
}

pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tourguide")
        .join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
