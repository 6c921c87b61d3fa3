//! Narration text preparation for TTS.
//!
//! [`sanitize`] strips everything a speech provider should not read aloud;
//! [`split_into_chunks`] bounds the cleaned text into per-request chunks.

pub mod chunker;
pub mod sanitize;

pub use chunker::{split_into_chunks, ChunkOptions, MIN_FLUSH_CHARS, PROVIDER_CHAR_LIMIT};
pub use sanitize::{
    sanitize, sanitize_with, SanitizeOptions, SanitizeStep, DEFAULT_MAX_LENGTH, SANITIZE_STEPS,
    SQL_KEYWORDS, WHITELIST,
};
