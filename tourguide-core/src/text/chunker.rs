//! Narration chunker.
//!
//! Splits sanitized narration into chunks sized for one TTS request each.
//! `max_chars` is a hard ceiling (provider request limit); every other bound
//! is a preference.
//!
//! ```text
//! text ─► sanitize (unbounded) ─► sentence units ─► word-split long units
//!      ─► greedy accumulation ─► tail flush ─► short-tail merge ─► chunks
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sanitize::sanitize;

/// Hard request ceiling of common TTS providers.
pub const PROVIDER_CHAR_LIMIT: usize = 4096;

/// Trailing accumulators shorter than this are treated as noise.
pub const MIN_FLUSH_CHARS: usize = 10;

/// A sentence-like unit: text up to and including a run of terminal
/// punctuation, or a trailing fragment with none.
static RE_SENTENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^.!?]*[.!?]+|[^.!?]+").expect("sentence pattern is a valid regex")
});

/// Chunk size preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ChunkOptions {
    /// Preferred minimum chunk length in characters.
    pub min_chars: usize,
    /// Hard maximum chunk length in characters.
    pub max_chars: usize,
    /// Preferred minimum word count.
    pub min_words: Option<usize>,
    /// Word ceiling applied while accumulating sentences.
    pub max_words: Option<usize>,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            min_chars: 200,
            max_chars: 300,
            min_words: None,
            max_words: None,
        }
    }
}

impl ChunkOptions {
    /// Clamp the options into a consistent shape: `max_chars ≥ 1`,
    /// `min_chars ≤ max_chars`, `min_words ≤ max_words`.
    pub fn normalized(&self) -> Self {
        let max_chars = self.max_chars.max(1);
        let max_words = self.max_words.map(|w| w.max(1));
        let min_words = match (self.min_words, max_words) {
            (Some(min), Some(max)) => Some(min.min(max)),
            (min, _) => min,
        };
        Self {
            min_chars: self.min_chars.min(max_chars),
            max_chars,
            min_words,
            max_words,
        }
    }

    /// Options whose `max_chars` never exceeds a provider's request limit.
    pub fn for_provider_limit(&self, limit: usize) -> Self {
        Self {
            max_chars: self.max_chars.min(limit.max(1)),
            ..self.clone()
        }
        .normalized()
    }

    fn meets_minimum(&self, chunk: &str) -> bool {
        chunk.len() >= self.min_chars
            || self
                .min_words
                .is_some_and(|min| word_count(chunk) >= min)
    }
}

/// Split `text` into TTS-sized chunks.
///
/// Never panics. Empty (or fully sanitized-away) input yields no chunks.
pub fn split_into_chunks(text: &str, opts: &ChunkOptions) -> Vec<String> {
    let opts = opts.normalized();
    let max = opts.max_chars;

    // Sanitized text is ASCII, so byte lengths below are character counts.
    let clean = sanitize(text, None);
    if clean.is_empty() {
        return Vec::new();
    }

    let parts: Vec<String> = sentence_units(&clean)
        .into_iter()
        .flat_map(|unit| split_long_unit(unit, max))
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for part in parts {
        if current.is_empty() {
            if part.len() > max {
                chunks.push(hard_truncate(&part, max));
            } else {
                current = part;
            }
            continue;
        }

        let fits_chars = current.len() + 1 + part.len() <= max;
        let fits_words = opts
            .max_words
            .map_or(true, |limit| word_count(&current) + word_count(&part) <= limit);

        if fits_chars && fits_words {
            current.push(' ');
            current.push_str(&part);
            continue;
        }

        // Nothing more fits; the chunk closes even when undersized.
        if !opts.meets_minimum(&current) {
            debug!(len = current.len(), "closing chunk below preferred minimum");
        }
        chunks.push(std::mem::take(&mut current));
        if part.len() > max {
            chunks.push(hard_truncate(&part, max));
        } else {
            current = part;
        }
    }

    flush_tail(&mut chunks, current.trim(), max);
    merge_short_last(&mut chunks, &opts);

    if chunks.is_empty() {
        let fallback = hard_truncate(&clean, max);
        let fallback = fallback.trim();
        if !fallback.is_empty() {
            chunks.push(fallback.to_string());
        }
    }

    chunks
}

fn flush_tail(chunks: &mut Vec<String>, tail: &str, max: usize) {
    if tail.is_empty() {
        return;
    }
    if tail.len() >= MIN_FLUSH_CHARS {
        chunks.push(tail.to_string());
        return;
    }
    match chunks.last_mut() {
        Some(last) if last.len() + 1 + tail.len() <= max => {
            last.push(' ');
            last.push_str(tail);
        }
        Some(_) => debug!(tail, "dropping trailing fragment"),
        None => {}
    }
}

/// Fold a very short final chunk into the previous one so it does not go to
/// TTS alone. The hard ceiling still applies to the merged chunk.
fn merge_short_last(chunks: &mut Vec<String>, opts: &ChunkOptions) {
    if chunks.len() < 2 {
        return;
    }
    let last_len = chunks[chunks.len() - 1].len();
    if last_len >= opts.min_chars / 2 {
        return;
    }
    let prev_len = chunks[chunks.len() - 2].len();
    if prev_len + 1 + last_len > opts.max_chars {
        return;
    }
    if let Some(last) = chunks.pop() {
        if let Some(prev) = chunks.last_mut() {
            prev.push(' ');
            prev.push_str(&last);
        }
    }
}

fn sentence_units(text: &str) -> Vec<&str> {
    RE_SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|unit| !unit.is_empty())
        .collect()
}

/// Split a unit longer than `max` at word boundaries. A single word longer
/// than `max` is cut into `max`-sized pieces.
fn split_long_unit(unit: &str, max: usize) -> Vec<String> {
    if unit.len() <= max {
        return vec![unit.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    for word in unit.split_whitespace() {
        if word.len() > max {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            parts.extend(chars.chunks(max).map(|piece| piece.iter().collect::<String>()));
            continue;
        }
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= max {
            current.push(' ');
            current.push_str(word);
        } else {
            parts.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn hard_truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(min_chars: usize, max_chars: usize) -> ChunkOptions {
        ChunkOptions {
            min_chars,
            max_chars,
            ..ChunkOptions::default()
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_into_chunks("", &ChunkOptions::default()).is_empty());
        assert!(split_into_chunks("  🎉 ### ", &ChunkOptions::default()).is_empty());
    }

    #[test]
    fn short_sentence_is_one_chunk() {
        let chunks = split_into_chunks("Hello world.", &ChunkOptions::default());
        assert_eq!(chunks, vec!["Hello world."]);
    }

    #[test]
    fn tiny_input_falls_back_to_single_chunk() {
        assert_eq!(split_into_chunks("Hi.", &ChunkOptions::default()), vec!["Hi."]);
    }

    #[test]
    fn text_without_terminal_punctuation_is_one_unit() {
        assert_eq!(sentence_units("no stops at all here"), vec!["no stops at all here"]);
        assert_eq!(
            sentence_units("One. Two!? trailing bit"),
            vec!["One.", "Two!?", "trailing bit"]
        );
    }

    #[test]
    fn sentences_are_grouped_up_to_max_chars() {
        let sentence = "The old harbour was rebuilt after the great fire of the city.";
        let text = vec![sentence; 12].join(" ");
        let chunks = split_into_chunks(&text, &ChunkOptions::default());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 300, "chunk too long: {}", chunk.len());
            assert!(chunk.ends_with('.'), "chunk should end on a sentence: {chunk}");
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn long_sentence_is_split_at_word_boundaries() {
        let text = format!("{}.", "cathedral ".repeat(60).trim());
        let chunks = split_into_chunks(&text, &opts(50, 80));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 80);
            assert!(chunk.split(' ').all(|w| w.starts_with("cathedral")), "split inside a word: {chunk}");
        }
    }

    #[test]
    fn oversized_word_is_hard_cut() {
        let word = "a".repeat(250);
        let chunks = split_into_chunks(&word, &opts(10, 100));
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 250);
    }

    #[test]
    fn word_ceiling_closes_chunks() {
        let text = "One two three four five six seven. Eight nine ten eleven.";
        let limited = ChunkOptions {
            min_chars: 20,
            max_chars: 120,
            min_words: None,
            max_words: Some(8),
        };
        let chunks = split_into_chunks(text, &limited);
        assert_eq!(
            chunks,
            vec!["One two three four five six seven.", "Eight nine ten eleven."]
        );
    }

    #[test]
    fn short_last_chunk_merges_backward() {
        let text = "One two three four five six seven. Eight nine ten eleven.";
        let limited = ChunkOptions {
            min_chars: 100,
            max_chars: 120,
            min_words: None,
            max_words: Some(8),
        };
        let chunks = split_into_chunks(text, &limited);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn micro_tail_that_cannot_merge_is_dropped() {
        let text = "The first sentence is fairly long here. Ok.";
        let chunks = split_into_chunks(text, &opts(10, 40));
        assert_eq!(chunks, vec!["The first sentence is fairly long here."]);
    }

    #[test]
    fn chunks_are_sanitized() {
        let chunks = split_into_chunks(
            "**Welcome** to https://example.com the *Old Town*! 🎉 Enjoy.",
            &ChunkOptions::default(),
        );
        assert_eq!(chunks, vec!["Welcome to the Old Town! Enjoy."]);
    }

    #[test]
    fn options_are_normalized() {
        let odd = ChunkOptions {
            min_chars: 500,
            max_chars: 0,
            min_words: Some(40),
            max_words: Some(10),
        }
        .normalized();
        assert_eq!(odd.max_chars, 1);
        assert_eq!(odd.min_chars, 1);
        assert_eq!(odd.min_words, Some(10));
    }

    #[test]
    fn provider_limit_caps_max_chars() {
        let capped = opts(200, 9000).for_provider_limit(PROVIDER_CHAR_LIMIT);
        assert_eq!(capped.max_chars, 4096);
        let untouched = ChunkOptions::default().for_provider_limit(PROVIDER_CHAR_LIMIT);
        assert_eq!(untouched.max_chars, 300);
    }

    #[test]
    fn max_chars_of_one_never_panics() {
        let chunks = split_into_chunks("Tiny. Text here.", &opts(0, 1));
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.len() == 1));
    }
}
