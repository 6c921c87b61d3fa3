use thiserror::Error;

/// All errors produced by tourguide-core.
#[derive(Debug, Error)]
pub enum TourError {
    #[error("guide has no audio segments")]
    NoSegments,

    #[error("segment {index} out of range (guide has {count})")]
    SegmentOutOfRange { index: usize, count: usize },

    #[error("chapter {index} out of range (guide has {count})")]
    ChapterOutOfRange { index: usize, count: usize },

    #[error("segment {index} has no audio uri")]
    MissingUri { index: usize },

    #[error("invalid guide: {0}")]
    InvalidGuide(String),

    #[error("asset fetch failed: {0}")]
    Fetch(String),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("playback error: {0}")]
    Playback(String),

    /// A seek superseded by a newer one. Expected while scrubbing.
    #[error("seeking interrupted")]
    Interrupted,

    #[error("player is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TourError {
    /// `true` for errors the player swallows during rapid scrubbing.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TourError::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, TourError>;
