//! tourguide host entry point.
//!
//! A headless front end over `tourguide-core`: narration text preparation,
//! guide inspection, cache management and simulated playback. Results go to
//! stdout; logs go to stderr.

mod cli;
mod commands;
mod settings;
mod state;

use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use settings::default_settings_path;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("tourguide=info,tourguide_core=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut state = AppState::load(settings_path);
    if cli.no_cache {
        state.settings.cache_enabled = false;
    }
    info!(version = env!("CARGO_PKG_VERSION"), "tourguide starting");

    match cli.command {
        Commands::Sanitize {
            input,
            max_length,
            keep_keywords,
        } => commands::run_sanitize(&state, input, max_length, keep_keywords),
        Commands::Chunk {
            input,
            min_chars,
            max_chars,
            max_words,
            json,
        } => commands::run_chunk(&state, input, min_chars, max_chars, max_words, json),
        Commands::Inspect { guide, json } => commands::run_inspect(&state, &guide, json).await,
        Commands::Prefetch { guide } => commands::run_prefetch(&state, &guide).await,
        Commands::ClearCache => commands::run_clear_cache(&state).await,
        Commands::Play {
            guide,
            from,
            chapter,
            progress,
            speedup,
        } => {
            if let Some(factor) = speedup {
                state.settings.stub_speedup = factor;
                state.settings.normalize();
            }
            commands::run_play(&state, &guide, from, chapter, progress).await
        }
        Commands::Settings { save } => commands::run_settings(&state, save),
    }
}
