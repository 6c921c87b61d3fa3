//! Command handlers.
//!
//! Each handler takes the shared `AppState` plus its parsed arguments and
//! writes results to stdout; logs go to stderr.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tourguide_core::guide::{format_clock, secs_to_ms};
use tourguide_core::{
    sanitize_with, split_into_chunks, AudioGuide, LoadState, PlaybackEventKind, SegmentPlayer,
};
use tracing::{info, warn};

use crate::settings::save_settings;
use crate::state::AppState;

/// Read from `path`, or stdin for `None` / `-`.
fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => {
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn load_guide(path: &Path) -> anyhow::Result<AudioGuide> {
    let guide = AudioGuide::from_file(path)
        .with_context(|| format!("loading guide {}", path.display()))?;
    guide
        .validate()
        .with_context(|| format!("validating guide {}", path.display()))?;
    Ok(guide)
}

pub fn run_sanitize(
    state: &AppState,
    input: Option<PathBuf>,
    max_length: Option<usize>,
    keep_keywords: bool,
) -> anyhow::Result<()> {
    let text = read_input(input.as_deref())?;
    let mut opts = state.sanitize_options();
    if let Some(max) = max_length {
        opts.max_length = Some(max);
    }
    if keep_keywords {
        opts.strip_sql_keywords = false;
    }
    println!("{}", sanitize_with(&text, &opts));
    Ok(())
}

pub fn run_chunk(
    state: &AppState,
    input: Option<PathBuf>,
    min_chars: Option<usize>,
    max_chars: Option<usize>,
    max_words: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let text = read_input(input.as_deref())?;
    let mut opts = state.chunk_options();
    if let Some(min) = min_chars {
        opts.min_chars = min;
    }
    if let Some(max) = max_chars {
        opts.max_chars = max;
    }
    if max_words.is_some() {
        opts.max_words = max_words;
    }
    let opts = opts.for_provider_limit(state.settings.provider_char_limit);

    let chunks = split_into_chunks(&text, &opts);
    info!(
        chunks = chunks.len(),
        max_chars = opts.max_chars,
        input_chars = text.chars().count(),
        "text chunked"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
    } else {
        for (i, chunk) in chunks.iter().enumerate() {
            println!("[{:>3}] ({} chars) {chunk}", i + 1, chunk.len());
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SegmentSummary {
    index: usize,
    uri: String,
    start_ms: u64,
    end_ms: u64,
    cached: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChapterSummary {
    index: usize,
    title: String,
    start_ms: u64,
    duration_secs: Option<f64>,
    segment_index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GuideSummary {
    id: String,
    title: String,
    nominal_duration_secs: f64,
    timeline_ms: u64,
    segments: Vec<SegmentSummary>,
    chapters: Vec<ChapterSummary>,
}

async fn summarize(state: &AppState, guide: &AudioGuide) -> anyhow::Result<GuideSummary> {
    let cache = state.cache()?;
    let mut segments = Vec::with_capacity(guide.segments.len());
    for (index, seg) in guide.segments.iter().enumerate() {
        let cached = match &cache {
            Some(cache) => cache.is_cached(&seg.uri).await,
            None => false,
        };
        segments.push(SegmentSummary {
            index,
            uri: seg.uri.clone(),
            start_ms: seg.start_ms(),
            end_ms: seg.end_ms(),
            cached,
        });
    }

    let chapters = guide
        .chapters
        .iter()
        .enumerate()
        .map(|(index, ch)| ChapterSummary {
            index,
            title: ch.title.clone(),
            start_ms: ch.start_ms(),
            duration_secs: guide.chapter_duration_secs(index),
            segment_index: guide.resolve_segment(ch.start_ms()),
        })
        .collect();

    Ok(GuideSummary {
        id: guide.id.clone(),
        title: guide.title.clone(),
        nominal_duration_secs: guide.duration,
        timeline_ms: guide.timeline_duration_ms(),
        segments,
        chapters,
    })
}

pub async fn run_inspect(state: &AppState, path: &Path, json: bool) -> anyhow::Result<()> {
    let guide = load_guide(path)?;
    let summary = summarize(state, &guide).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} ({})", summary.title, summary.id);
    println!("timeline {}", format_clock(summary.timeline_ms));
    if secs_to_ms(summary.nominal_duration_secs) != summary.timeline_ms {
        println!(
            "  nominal duration {} differs; segment timeline is used",
            format_clock(secs_to_ms(summary.nominal_duration_secs))
        );
    }
    println!("segments:");
    for seg in &summary.segments {
        println!(
            "  {:>2}  {} - {}  {}{}",
            seg.index,
            format_clock(seg.start_ms),
            format_clock(seg.end_ms),
            seg.uri,
            if seg.cached { "  [cached]" } else { "" }
        );
    }
    if !guide.chapters.is_empty() {
        println!("chapters:");
        for (chapter, info) in guide.chapters.iter().zip(&summary.chapters) {
            let length = info
                .duration_secs
                .map(|d| format_clock(secs_to_ms(d)))
                .unwrap_or_default();
            println!(
                "  {:>2}  {}  ({length}, segment {})",
                info.index,
                chapter.label(),
                info.segment_index
            );
        }
    }
    Ok(())
}

pub async fn run_prefetch(state: &AppState, path: &Path) -> anyhow::Result<()> {
    let guide = load_guide(path)?;
    let Some(cache) = state.cache()? else {
        bail!("caching is disabled");
    };
    let report = cache.prefetch(&guide.segments).await;
    println!("{}", serde_json::to_string(&serde_json::json!({
        "cached": report.cached,
        "failed": report.failed,
        "skipped": report.skipped,
    }))?);
    if report.failed > 0 {
        warn!(failed = report.failed, "some segments will be streamed");
    }
    Ok(())
}

pub async fn run_clear_cache(state: &AppState) -> anyhow::Result<()> {
    let Some(cache) = state.cache()? else {
        bail!("caching is disabled");
    };
    let removed = cache.clear().await.context("clearing cache")?;
    println!("removed {removed} cached file(s) from {}", cache.dir().display());
    Ok(())
}

pub async fn run_play(
    state: &AppState,
    path: &Path,
    from_secs: Option<f64>,
    chapter: Option<usize>,
    progress: bool,
) -> anyhow::Result<()> {
    let guide = load_guide(path)?;
    let resume_ms = from_secs.map(secs_to_ms).unwrap_or(0);
    let player = SegmentPlayer::open(
        guide,
        state.backend(),
        state.cache()?,
        state.player_config(resume_ms),
    )
    .await
    .context("opening player")?;

    let opening = player.snapshot();
    if opening.load_state == LoadState::Error {
        player.close().await?;
        bail!(
            "failed to load opening segment: {}",
            opening.error.unwrap_or_default()
        );
    }

    let mut events = player.subscribe();
    match chapter {
        Some(index) => player.jump_to_chapter(index).await?,
        None => player.toggle_play_pause().await?,
    }

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if event.kind != PlaybackEventKind::Progress || progress {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                    match event.kind {
                        PlaybackEventKind::Finished => break Ok(()),
                        PlaybackEventKind::Error => {
                            break Err(anyhow::anyhow!(
                                "playback stopped: {}",
                                event.snapshot.error.unwrap_or_default()
                            ))
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event consumer lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
        }
    };

    player.close().await?;
    outcome
}

pub fn run_settings(state: &AppState, save: bool) -> anyhow::Result<()> {
    if save {
        save_settings(&state.settings_path, &state.settings)
            .with_context(|| format!("writing {}", state.settings_path.display()))?;
        info!(path = %state.settings_path.display(), "settings saved");
    }
    println!("{}", state.settings_path.display());
    println!("{}", serde_json::to_string_pretty(&state.settings)?);
    Ok(())
}
