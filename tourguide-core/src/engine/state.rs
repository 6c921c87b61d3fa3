//! Mutable player state and the speed ladder.

use crate::guide::AudioGuide;
use crate::ipc::events::{LoadState, PlaybackSnapshot};

/// Speeds cycled by `SegmentPlayer::change_speed`, wrapping to the first.
pub const SPEED_LADDER: [f32; 3] = [1.0, 1.5, 2.0];

/// Next rung of the ladder after `current`. Off-ladder speeds reset to 1.0.
pub fn next_speed(current: f32) -> f32 {
    SPEED_LADDER
        .iter()
        .position(|s| (s - current).abs() < 1e-3)
        .map(|i| SPEED_LADDER[(i + 1) % SPEED_LADDER.len()])
        .unwrap_or(SPEED_LADDER[0])
}

#[derive(Debug, Clone)]
pub(crate) struct PlaybackState {
    pub load_state: LoadState,
    /// Play intent. Set by user operations and segment completion, never by
    /// progress ticks.
    pub is_playing: bool,
    pub is_seeking: bool,
    pub segment_index: usize,
    pub global_position_ms: u64,
    pub speed: f32,
    pub error: Option<String>,
    /// Bumped per scrub gesture so a late debounce release cannot clear a
    /// newer gesture's guard.
    pub scrub_epoch: u64,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            load_state: LoadState::Loading,
            is_playing: false,
            is_seeking: false,
            segment_index: 0,
            global_position_ms: 0,
            speed: SPEED_LADDER[0],
            error: None,
            scrub_epoch: 0,
        }
    }

    pub fn snapshot(&self, guide: &AudioGuide) -> PlaybackSnapshot {
        let local_position_ms = guide
            .segments
            .get(self.segment_index)
            .map(|seg| seg.local_position_ms(self.global_position_ms))
            .unwrap_or(0);
        PlaybackSnapshot {
            load_state: self.load_state,
            is_playing: self.is_playing,
            is_seeking: self.is_seeking,
            segment_index: self.segment_index,
            segment_count: guide.segments.len(),
            global_position_ms: self.global_position_ms,
            local_position_ms,
            duration_ms: guide.timeline_duration_ms(),
            speed: self.speed,
            chapter_index: guide.chapter_at(self.global_position_ms),
            error: self.error.clone(),
        }
    }
}
