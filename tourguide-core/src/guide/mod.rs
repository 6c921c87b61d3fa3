//! Guide timeline model: audio segments, chapters and global/local time math.
//!
//! All stored times are seconds (as produced upstream); the player works in
//! milliseconds. A guide's segments are sorted by `start_time` and may leave
//! gaps, which play as silence rather than errors.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TourError};

/// One audio asset covering part of the guide timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSegment {
    /// Local file path or `http(s)` URL.
    pub uri: String,
    /// Global start time in seconds.
    pub start_time: f64,
    /// Duration in seconds.
    pub duration: f64,
}

impl AudioSegment {
    pub fn new(uri: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self {
            uri: uri.into(),
            start_time,
            duration,
        }
    }

    pub fn start_ms(&self) -> u64 {
        secs_to_ms(self.start_time)
    }

    pub fn duration_ms(&self) -> u64 {
        secs_to_ms(self.duration)
    }

    pub fn end_ms(&self) -> u64 {
        secs_to_ms(self.start_time + self.duration)
    }

    /// Offset into this segment's own asset for a global position.
    pub fn local_position_ms(&self, global_ms: u64) -> u64 {
        global_ms.saturating_sub(self.start_ms())
    }

    /// Global position for an offset into this segment's asset.
    pub fn global_position_ms(&self, local_ms: u64) -> u64 {
        self.start_ms() + local_ms
    }

    pub fn has_uri(&self) -> bool {
        !self.uri.trim().is_empty()
    }
}

/// A named jump target on the guide timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub title: String,
    /// Global start in seconds.
    pub timestamp: f64,
    /// Explicit length in seconds, when the generator supplied one.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl Chapter {
    pub fn start_ms(&self) -> u64 {
        secs_to_ms(self.timestamp)
    }

    /// `"m:ss  Title"` label for chapter lists.
    pub fn label(&self) -> String {
        format!("{}  {}", format_clock(self.start_ms()), self.title)
    }
}

/// An audio tour as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioGuide {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Nominal length in seconds, as reported by the generator.
    #[serde(default)]
    pub duration: f64,
    pub segments: Vec<AudioSegment>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl AudioGuide {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the invariants the player relies on.
    ///
    /// # Errors
    /// - `TourError::NoSegments` for an empty segment list.
    /// - `TourError::InvalidGuide` for negative / non-finite times or
    ///   segments out of `start_time` order.
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(TourError::NoSegments);
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if !seg.start_time.is_finite() || seg.start_time < 0.0 {
                return Err(TourError::InvalidGuide(format!(
                    "segment {i} has invalid start time {}",
                    seg.start_time
                )));
            }
            if !seg.duration.is_finite() || seg.duration < 0.0 {
                return Err(TourError::InvalidGuide(format!(
                    "segment {i} has invalid duration {}",
                    seg.duration
                )));
            }
        }
        if let Some(i) = self
            .segments
            .windows(2)
            .position(|pair| pair[1].start_time < pair[0].start_time)
        {
            return Err(TourError::InvalidGuide(format!(
                "segment {} starts before segment {i}",
                i + 1
            )));
        }
        Ok(())
    }

    /// Index of the segment that plays at `global_ms`.
    pub fn resolve_segment(&self, global_ms: u64) -> usize {
        resolve_segment(&self.segments, global_ms)
    }

    /// Playable timeline length in seconds.
    ///
    /// The segment-derived end wins whenever segments exist; the nominal
    /// `duration` is only used for a guide without segments.
    pub fn timeline_duration_secs(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.start_time + s.duration)
            .reduce(f64::max)
            .unwrap_or(self.duration.max(0.0))
    }

    pub fn timeline_duration_ms(&self) -> u64 {
        secs_to_ms(self.timeline_duration_secs())
    }

    /// Chapter length: explicit duration, else the gap to the next chapter,
    /// else whatever remains of the timeline.
    pub fn chapter_duration_secs(&self, index: usize) -> Option<f64> {
        let chapter = self.chapters.get(index)?;
        if let Some(duration) = chapter.duration.filter(|d| d.is_finite() && *d >= 0.0) {
            return Some(duration);
        }
        let end = match self.chapters.get(index + 1) {
            Some(next) => next.timestamp,
            None => self.timeline_duration_secs(),
        };
        Some((end - chapter.timestamp).max(0.0))
    }

    /// Index of the chapter covering `global_ms`, if any chapter has started.
    pub fn chapter_at(&self, global_ms: u64) -> Option<usize> {
        self.chapters
            .iter()
            .rposition(|chapter| chapter.start_ms() <= global_ms)
    }
}

/// Resolve a global position to a segment index.
///
/// The active segment is the last one whose start is at or before
/// `global_ms`. Positions before the first segment, and empty lists,
/// resolve to 0.
pub fn resolve_segment(segments: &[AudioSegment], global_ms: u64) -> usize {
    segments
        .iter()
        .rposition(|seg| seg.start_ms() <= global_ms)
        .unwrap_or(0)
}

pub fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// `m:ss` (or `h:mm:ss`) clock text for a millisecond position.
pub fn format_clock(ms: u64) -> String {
    let total = ms / 1000;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segments() -> Vec<AudioSegment> {
        vec![AudioSegment::new("a", 0.0, 10.0), AudioSegment::new("b", 10.0, 15.0)]
    }

    fn guide(segments: Vec<AudioSegment>, chapters: Vec<Chapter>, duration: f64) -> AudioGuide {
        AudioGuide {
            id: "g1".into(),
            title: "Old Town".into(),
            duration,
            segments,
            chapters,
        }
    }

    fn chapter(title: &str, timestamp: f64, duration: Option<f64>) -> Chapter {
        Chapter {
            title: title.into(),
            timestamp,
            duration,
        }
    }

    #[test]
    fn resolves_last_segment_starting_at_or_before() {
        let segs = two_segments();
        assert_eq!(resolve_segment(&segs, 9_999), 0);
        assert_eq!(resolve_segment(&segs, 10_000), 1);
        assert_eq!(resolve_segment(&segs, 10_001), 1);
        assert_eq!(resolve_segment(&segs, 25_000), 1);
        assert_eq!(resolve_segment(&segs, 99_000_000), 1);
    }

    #[test]
    fn position_before_first_segment_resolves_to_zero() {
        let segs = vec![AudioSegment::new("a", 5.0, 10.0), AudioSegment::new("b", 15.0, 5.0)];
        assert_eq!(resolve_segment(&segs, 1_000), 0);
        assert_eq!(resolve_segment(&[], 1_000), 0);
    }

    #[test]
    fn local_position_never_negative() {
        let seg = AudioSegment::new("b", 900.0, 1200.0);
        assert_eq!(seg.local_position_ms(1_500_000), 600_000);
        assert_eq!(seg.local_position_ms(100), 0);
        assert_eq!(seg.global_position_ms(600_000), 1_500_000);
    }

    #[test]
    fn timeline_prefers_segment_end_over_nominal_duration() {
        let g = guide(two_segments(), vec![], 40.0);
        assert_eq!(g.timeline_duration_ms(), 25_000);

        let empty = guide(vec![], vec![], 40.0);
        assert_eq!(empty.timeline_duration_ms(), 40_000);
    }

    #[test]
    fn chapter_duration_precedence() {
        let g = guide(
            two_segments(),
            vec![
                chapter("Gate", 0.0, Some(4.0)),
                chapter("Square", 8.0, None),
                chapter("Harbour", 20.0, None),
            ],
            60.0,
        );
        assert_eq!(g.chapter_duration_secs(0), Some(4.0));
        assert_eq!(g.chapter_duration_secs(1), Some(12.0));
        assert_eq!(g.chapter_duration_secs(2), Some(5.0));
        assert_eq!(g.chapter_duration_secs(3), None);
    }

    #[test]
    fn chapter_lookup_and_label() {
        let g = guide(
            two_segments(),
            vec![chapter("Gate", 2.0, None), chapter("Square", 75.0, None)],
            0.0,
        );
        assert_eq!(g.chapter_at(1_000), None);
        assert_eq!(g.chapter_at(2_000), Some(0));
        assert_eq!(g.chapter_at(80_000), Some(1));
        assert_eq!(g.chapters[1].label(), "1:15  Square");
        assert_eq!(format_clock(3_723_000), "1:02:03");
    }

    #[test]
    fn validate_rejects_unsorted_and_empty() {
        assert!(matches!(guide(vec![], vec![], 0.0).validate(), Err(TourError::NoSegments)));

        let unsorted = guide(
            vec![AudioSegment::new("a", 10.0, 5.0), AudioSegment::new("b", 0.0, 5.0)],
            vec![],
            0.0,
        );
        assert!(matches!(unsorted.validate(), Err(TourError::InvalidGuide(_))));

        let negative = guide(vec![AudioSegment::new("a", -1.0, 5.0)], vec![], 0.0);
        assert!(matches!(negative.validate(), Err(TourError::InvalidGuide(_))));

        assert!(guide(two_segments(), vec![], 0.0).validate().is_ok());
    }

    #[test]
    fn guide_parses_camel_case_json() {
        let json = r#"{
            "id": "tour-7",
            "title": "Harbour walk",
            "duration": 2400,
            "segments": [
                {"uri": "https://cdn.example.com/a.mp3", "startTime": 0, "duration": 900},
                {"uri": "https://cdn.example.com/b.mp3", "startTime": 900, "duration": 1200}
            ],
            "chapters": [{"title": "Intro", "timestamp": 0}]
        }"#;
        let g = AudioGuide::from_json(json).expect("parse guide");
        assert_eq!(g.segments.len(), 2);
        assert_eq!(g.segments[1].start_ms(), 900_000);
        assert_eq!(g.chapters[0].duration, None);
        assert_eq!(g.timeline_duration_ms(), 2_100_000);
    }
}
