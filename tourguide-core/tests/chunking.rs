use tourguide_core::text::{sanitize_with, SanitizeOptions, PROVIDER_CHAR_LIMIT, WHITELIST};
use tourguide_core::{sanitize, split_into_chunks, ChunkOptions};

const WORDS: &[&str] = &[
    "the", "harbour", "was", "built", "in", "seventeen", "ninety", "by", "merchants", "who",
    "traded", "salt", "and", "timber", "along", "coast", "walk", "past", "old", "customs",
    "house", "towards", "lighthouse", "where", "fishermen", "still", "mend", "their", "nets",
    "every", "morning",
];

/// Deterministic prose: sentences of 4..=24 words ending in `.`, `!` or `?`.
fn prose(seed: u64, sentences: usize) -> String {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    let mut next = move |bound: usize| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) as usize) % bound
    };

    let mut out = Vec::with_capacity(sentences);
    for _ in 0..sentences {
        let len = 4 + next(21);
        let mut words: Vec<String> = (0..len).map(|_| WORDS[next(WORDS.len())].to_string()).collect();
        if let Some(first) = words.first_mut() {
            *first = capitalize(first);
        }
        let end = ['.', '!', '?'][next(3)];
        out.push(format!("{}{end}", words.join(" ")));
    }
    out.join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn option_grid() -> Vec<ChunkOptions> {
    vec![
        ChunkOptions::default(),
        ChunkOptions {
            min_chars: 40,
            max_chars: 80,
            ..ChunkOptions::default()
        },
        ChunkOptions {
            min_chars: 0,
            max_chars: 120,
            min_words: Some(5),
            max_words: Some(12),
        },
        ChunkOptions {
            min_chars: 500,
            max_chars: 1_000,
            ..ChunkOptions::default()
        },
        ChunkOptions {
            min_chars: 100,
            max_chars: 300,
            min_words: None,
            max_words: Some(30),
        },
    ]
}

#[test]
fn chunks_respect_hard_ceiling_and_are_never_empty() {
    for seed in 0..20 {
        let text = prose(seed, 30);
        for opts in option_grid() {
            let chunks = split_into_chunks(&text, &opts);
            assert!(!chunks.is_empty(), "seed {seed}: no chunks");
            for chunk in &chunks {
                assert!(!chunk.trim().is_empty(), "seed {seed}: empty chunk");
                assert!(
                    chunk.chars().count() <= opts.max_chars,
                    "seed {seed}: chunk of {} chars exceeds {}",
                    chunk.chars().count(),
                    opts.max_chars
                );
            }
        }
    }
}

#[test]
fn joined_chunks_reconstruct_sanitized_prose() {
    for seed in 0..20 {
        let text = prose(seed, 25);
        let clean = sanitize_with(&text, &SanitizeOptions::unbounded());
        // Ceilings above the longest generated sentence, so nothing is cut.
        for opts in option_grid().into_iter().filter(|o| o.max_chars >= 300) {
            let chunks = split_into_chunks(&text, &opts);
            assert_eq!(chunks.join(" "), clean, "seed {seed}, opts {opts:?}");
        }
    }
}

#[test]
fn messy_input_still_yields_clean_bounded_chunks() {
    let inputs = [
        "<p>Welcome to the <b>Old Town</b>!</p> <script>alert('x')</script>",
        "**Stop 1:** the fountain 🏛️ — built 1620… see https://example.com/fountain",
        "- first item\n- second item\n\n1. numbered item",
        "!!!???...,,,;;;",
        "Ünïcödé wörds and “smart quotes” everywhere",
        "supercalifragilisticexpialidocious-antidisestablishmentarianism-pneumonoultramicroscopic",
        "no terminal punctuation at all in this rather long line of narration text",
    ];
    let opts = ChunkOptions {
        min_chars: 10,
        max_chars: 24,
        ..ChunkOptions::default()
    };

    for input in inputs {
        let chunks = split_into_chunks(input, &opts);
        for chunk in &chunks {
            assert!(chunk.len() <= 24, "{input:?} -> {chunk:?}");
            assert!(!chunk.is_empty());
            assert!(
                chunk.chars().all(|c| WHITELIST.contains(c)),
                "{input:?} -> {chunk:?} has non-whitelisted chars"
            );
        }
    }
}

#[test]
fn boundary_cases() {
    let opts = ChunkOptions::default();
    assert!(split_into_chunks("", &opts).is_empty());
    assert!(split_into_chunks("   \n\t", &opts).is_empty());
    assert!(split_into_chunks("<br/>", &opts).is_empty());
    assert_eq!(split_into_chunks("Hello world.", &opts), vec!["Hello world."]);
}

#[test]
fn order_is_preserved() {
    let text = "First stop is the gate. Second stop is the square. Third stop is the harbour.";
    let opts = ChunkOptions {
        min_chars: 0,
        max_chars: 30,
        ..ChunkOptions::default()
    };
    let chunks = split_into_chunks(text, &opts);
    assert_eq!(
        chunks,
        vec![
            "First stop is the gate.",
            "Second stop is the square.",
            "Third stop is the harbour.",
        ]
    );
}

#[test]
fn provider_limit_caps_requested_ceiling() {
    let text = prose(7, 400);
    let opts = ChunkOptions {
        min_chars: 5_000,
        max_chars: 10_000,
        ..ChunkOptions::default()
    }
    .for_provider_limit(PROVIDER_CHAR_LIMIT);

    let chunks = split_into_chunks(&text, &opts);
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.len() <= PROVIDER_CHAR_LIMIT));
}

#[test]
fn sanitize_is_idempotent_on_generated_prose() {
    for seed in 0..10 {
        let text = format!("<i>{}</i> 🎧 https://tour.example/{seed}", prose(seed, 12));
        let once = sanitize(&text, Some(200));
        assert_eq!(sanitize(&once, Some(200)), once);
        assert!(once.len() <= 200);
    }
}
