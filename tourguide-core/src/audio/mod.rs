//! Playback primitive abstraction.
//!
//! The `AudioBackend` trait decouples the segment player from any concrete
//! audio stack (platform media player, simulated clock, test double). A
//! backend turns a `SoundRequest` into a `SoundHandle` and reports progress
//! through the `ProgressSink` it was given.
//!
//! Every sink is stamped with the player's load generation, so statuses from
//! a superseded handle can be recognised and dropped by the receiver.

pub mod stub;

pub use stub::{StubBackend, StubConfig};

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Where the bytes for a segment come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// A file on local disk (cached asset or bundled audio).
    Local(PathBuf),
    /// Streamed directly from a remote URL.
    Remote(String),
}

impl AudioSource {
    /// Classify a raw segment URI.
    pub fn from_uri(uri: &str) -> Self {
        if is_remote(uri) {
            AudioSource::Remote(uri.to_string())
        } else {
            AudioSource::Local(PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri)))
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AudioSource::Local(_))
    }
}

impl std::fmt::Display for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioSource::Local(path) => write!(f, "{}", path.display()),
            AudioSource::Remote(url) => f.write_str(url),
        }
    }
}

/// `true` for `http://` and `https://` URIs.
pub fn is_remote(uri: &str) -> bool {
    let lower = uri.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Parameters for creating one sound.
#[derive(Debug, Clone)]
pub struct SoundRequest {
    pub source: AudioSource,
    /// Initial offset into the asset.
    pub start_position_ms: u64,
    /// Expected asset length from the guide, when known.
    pub duration_hint_ms: Option<u64>,
}

/// One progress report from a live sound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoundStatus {
    /// Position within the asset (local time).
    pub position_ms: u64,
    pub is_playing: bool,
    /// Set once, when playback reaches the end of the asset.
    pub did_finish: bool,
    /// Asynchronous playback failure reported by the backend.
    pub error: Option<String>,
}

/// A status tagged with the load generation of the handle that produced it.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub generation: u64,
    pub status: SoundStatus,
}

/// Sender half handed to a backend for progress reporting.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self { generation, tx }
    }

    /// Sink plus its receiving end, for driving a backend directly.
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(generation, tx), rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward a status. Returns `false` once the receiver is gone, which a
    /// backend should treat as a signal to stop reporting.
    pub fn emit(&self, status: SoundStatus) -> bool {
        self.tx
            .send(ProgressUpdate {
                generation: self.generation,
                status,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Contract for audio playback backends.
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    /// Load (decode or open) an asset, positioned at `start_position_ms`
    /// and paused.
    ///
    /// # Errors
    /// `TourError::Decode` / `TourError::Fetch` when the asset cannot be
    /// opened.
    async fn create(&self, request: SoundRequest, sink: ProgressSink) -> Result<Box<dyn SoundHandle>>;
}

/// A loaded asset. Positions are local to the asset.
///
/// `set_position` may fail with `TourError::Interrupted` when a newer seek
/// supersedes it; callers treat that as benign.
#[async_trait]
pub trait SoundHandle: Send + Sync {
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    /// Release the asset. No progress is reported afterwards.
    async fn unload(&self) -> Result<()>;
    async fn set_position(&self, position_ms: u64) -> Result<()>;
    /// Playback speed; pitch correction is up to the backend.
    async fn set_rate(&self, rate: f32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_uris() {
        assert_eq!(
            AudioSource::from_uri("https://cdn.example.com/a.mp3"),
            AudioSource::Remote("https://cdn.example.com/a.mp3".into())
        );
        assert_eq!(
            AudioSource::from_uri("HTTP://cdn.example.com/a.mp3"),
            AudioSource::Remote("HTTP://cdn.example.com/a.mp3".into())
        );
        assert_eq!(
            AudioSource::from_uri("file:///tmp/a.mp3"),
            AudioSource::Local(PathBuf::from("/tmp/a.mp3"))
        );
        assert!(AudioSource::from_uri("audio/intro.m4a").is_local());
    }

    #[tokio::test]
    async fn sink_tags_generation_and_detects_closed_receiver() {
        let (sink, mut rx) = ProgressSink::channel(4);
        assert!(sink.emit(SoundStatus {
            position_ms: 120,
            is_playing: true,
            ..SoundStatus::default()
        }));

        let update = rx.recv().await.expect("update");
        assert_eq!(update.generation, 4);
        assert_eq!(update.status.position_ms, 120);

        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.emit(SoundStatus::default()));
    }
}
