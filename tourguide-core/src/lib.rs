//! # tourguide-core
//!
//! Narration text preparation and segment-stitched audio playback for
//! generated audio tours.
//!
//! ## Architecture
//!
//! ```text
//! narration text → sanitize → split_into_chunks → TTS provider (external)
//!
//! AudioGuide { segments, chapters }
//!        │
//!   SegmentPlayer ── AssetCache (sha256-keyed files, AssetFetcher)
//!        │
//!   AudioBackend::create → SoundHandle ──ProgressSink──► progress pump
//!                                                            │
//!                                          broadcast::Sender<PlaybackEvent>
//! ```
//!
//! The player presents many assets as one timeline: global positions are
//! resolved to a segment and a local offset, and only the newest segment
//! load is ever allowed to touch state.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod cache;
pub mod engine;
pub mod error;
pub mod guide;
pub mod ipc;
pub mod text;

// Convenience re-exports for downstream crates
pub use audio::{
    AudioBackend, AudioSource, ProgressSink, ProgressUpdate, SoundHandle, SoundRequest,
    SoundStatus, StubBackend, StubConfig,
};
pub use cache::{AssetCache, AssetFetcher, CacheConfig, PrefetchReport};
pub use engine::{LoadRequest, PlayerConfig, SegmentPlayer, SPEED_LADDER};
pub use error::{Result, TourError};
pub use guide::{resolve_segment, AudioGuide, AudioSegment, Chapter};
pub use ipc::events::{LoadState, PlaybackEvent, PlaybackEventKind, PlaybackSnapshot};
pub use text::{sanitize, sanitize_with, split_into_chunks, ChunkOptions, SanitizeOptions};

#[cfg(feature = "http")]
pub use cache::HttpFetcher;
