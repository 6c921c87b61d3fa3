//! Event types broadcast to host UIs.
//!
//! Every `PlaybackEvent` carries a full `PlaybackSnapshot`, so a consumer
//! that misses events (lagged broadcast receiver) can re-sync from the next
//! one without querying the player.

use serde::{Deserialize, Serialize};

/// Load state of the active segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// A segment load is in flight.
    Loading,
    /// The active segment's asset is loaded and controllable.
    Ready,
    /// The last load failed; see `PlaybackSnapshot::error`.
    Error,
}

/// Point-in-time view of the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub load_state: LoadState,
    pub is_playing: bool,
    /// `true` while a scrub gesture owns the position.
    pub is_seeking: bool,
    pub segment_index: usize,
    pub segment_count: usize,
    /// Position on the full guide timeline.
    pub global_position_ms: u64,
    /// Position inside the active segment's asset.
    pub local_position_ms: u64,
    /// Playable timeline length.
    pub duration_ms: u64,
    pub speed: f32,
    pub chapter_index: Option<usize>,
    pub error: Option<String>,
}

/// What triggered a `PlaybackEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackEventKind {
    /// A segment load started.
    Loading,
    /// A segment finished loading.
    Loaded,
    /// Periodic position update.
    Progress,
    /// Play/pause toggled.
    PlayState,
    /// Seek or scrub moved the position.
    Seeked,
    SpeedChanged,
    /// A segment played to its end and the next one is loading.
    SegmentFinished,
    /// The last segment played to its end.
    Finished,
    Error,
    Closed,
}

/// Emitted on every player state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub kind: PlaybackEventKind,
    pub snapshot: PlaybackSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PlaybackSnapshot {
        PlaybackSnapshot {
            load_state: LoadState::Ready,
            is_playing: true,
            is_seeking: false,
            segment_index: 1,
            segment_count: 3,
            global_position_ms: 1_500_000,
            local_position_ms: 600_000,
            duration_ms: 2_400_000,
            speed: 1.5,
            chapter_index: Some(2),
            error: None,
        }
    }

    #[test]
    fn playback_event_serializes_with_camel_case_fields() {
        let event = PlaybackEvent {
            seq: 7,
            kind: PlaybackEventKind::SegmentFinished,
            snapshot: snapshot(),
        };

        let json = serde_json::to_value(&event).expect("serialize playback event");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["kind"], "segmentFinished");
        assert_eq!(json["snapshot"]["loadState"], "ready");
        assert_eq!(json["snapshot"]["segmentIndex"], 1);
        assert_eq!(json["snapshot"]["globalPositionMs"], 1_500_000);
        assert_eq!(json["snapshot"]["localPositionMs"], 600_000);
        assert_eq!(json["snapshot"]["chapterIndex"], 2);
        assert!(json["snapshot"]["error"].is_null());
        let speed = json["snapshot"]["speed"]
            .as_f64()
            .expect("speed should serialize as number");
        assert!((speed - 1.5).abs() < 1e-6);

        let round_trip: PlaybackEvent =
            serde_json::from_value(json).expect("deserialize playback event");
        assert_eq!(round_trip.kind, PlaybackEventKind::SegmentFinished);
        assert_eq!(round_trip.snapshot, snapshot());
    }

    #[test]
    fn load_state_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<LoadState>(r#""Ready""#);
        assert!(err.is_err(), "expected invalid casing to fail");
        assert_eq!(
            serde_json::from_str::<LoadState>(r#""error""#).expect("lowercase"),
            LoadState::Error
        );
    }
}
