//! Command-line interface for the tourguide host.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Prepare narration text for TTS and play segmented audio guides
#[derive(Parser, Debug)]
#[command(name = "tourguide", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to settings file (default: platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Stream remote audio instead of caching it
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clean narration text for a speech provider
    Sanitize {
        /// Input file, or `-` / omitted for stdin
        input: Option<PathBuf>,

        /// Output bound in characters (default from settings)
        #[arg(long, value_name = "CHARS")]
        max_length: Option<usize>,

        /// Keep SQL-like keywords such as "select" and "update"
        #[arg(long)]
        keep_keywords: bool,
    },

    /// Split narration text into TTS-sized chunks
    Chunk {
        /// Input file, or `-` / omitted for stdin
        input: Option<PathBuf>,

        /// Preferred minimum chunk size
        #[arg(long, value_name = "CHARS")]
        min_chars: Option<usize>,

        /// Hard chunk ceiling
        #[arg(long, value_name = "CHARS")]
        max_chars: Option<usize>,

        /// Word ceiling per chunk
        #[arg(long, value_name = "WORDS")]
        max_words: Option<usize>,

        /// Print a JSON array instead of numbered lines
        #[arg(long)]
        json: bool,
    },

    /// Show a guide's segments, chapters and timeline
    Inspect {
        /// Guide JSON file
        guide: PathBuf,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Download every remote segment of a guide into the cache
    Prefetch {
        /// Guide JSON file
        guide: PathBuf,
    },

    /// Delete all cached audio
    ClearCache,

    /// Play a guide on the simulated backend, printing events as JSON lines
    Play {
        /// Guide JSON file
        guide: PathBuf,

        /// Start position in seconds
        #[arg(long, value_name = "SECONDS", conflicts_with = "chapter")]
        from: Option<f64>,

        /// Start at this chapter (0-based)
        #[arg(long, value_name = "INDEX")]
        chapter: Option<usize>,

        /// Also print periodic progress events
        #[arg(long)]
        progress: bool,

        /// Virtual time multiplier for the simulated backend
        #[arg(long, value_name = "FACTOR")]
        speedup: Option<f64>,
    },

    /// Show the settings file path and current values
    Settings {
        /// Write the current (normalized) settings to disk
        #[arg(long)]
        save: bool,
    },
}
