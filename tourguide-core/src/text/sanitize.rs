//! Narration sanitizer.
//!
//! Cleans LLM-written narration into text that is safe to hand to a TTS
//! provider: no links, markup, scripts, emoji or symbols, and only the
//! characters in [`WHITELIST`].
//!
//! The cleanup is an ordered list of named steps ([`SANITIZE_STEPS`]) so each
//! rule can be audited and tested on its own. [`sanitize_with`] runs the list
//! until the text stops changing, which makes the result idempotent.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Default output bound, safely under common provider request limits.
pub const DEFAULT_MAX_LENGTH: usize = 1400;

/// Every character that may survive sanitization.
pub const WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 .,!?;:()'\"-";

/// Bare words removed by the keyword filter (matched case-insensitively).
pub const SQL_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "create", "alter", "exec", "execute", "union",
    "truncate", "grant", "revoke",
];

// ─────────────────────────────────────────────────────────────────────────────
// Compiled patterns
// ─────────────────────────────────────────────────────────────────────────────

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("sanitizer pattern is a valid regex")
}

static RE_SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| compile(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>"));
static RE_MARKUP_TAG: Lazy<Regex> = Lazy::new(|| compile(r"<[^>]*>"));
static RE_JS_PROTOCOL: Lazy<Regex> = Lazy::new(|| compile(r"(?i)javascript\s*:"));
static RE_EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| compile(r#"(?i)\bon[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#));

static RE_MD_CODE_FENCE: Lazy<Regex> = Lazy::new(|| compile(r"(?s)```[A-Za-z0-9_+-]*\n?(.*?)```"));
static RE_MD_INLINE_CODE: Lazy<Regex> = Lazy::new(|| compile(r"`([^`]*)`"));
static RE_MD_LINK: Lazy<Regex> = Lazy::new(|| compile(r"!?\[([^\]]*)\]\([^)]*\)"));
static RE_MD_BOLD: Lazy<Regex> = Lazy::new(|| compile(r"\*\*([^*]+)\*\*"));
static RE_MD_BOLD_UNDERSCORE: Lazy<Regex> = Lazy::new(|| compile(r"__([^_]+)__"));
static RE_MD_STRIKE: Lazy<Regex> = Lazy::new(|| compile(r"~~([^~]+)~~"));
static RE_MD_ITALIC: Lazy<Regex> = Lazy::new(|| compile(r"\*([^*\s][^*]*)\*"));
static RE_MD_ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| compile(r"\b_([^_\s][^_]*)_\b"));
static RE_MD_HEADING: Lazy<Regex> = Lazy::new(|| compile(r"(?m)^[ \t]*#{1,6}[ \t]*"));
static RE_MD_BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| compile(r"(?m)^[ \t]*>[ \t]?"));

static RE_LIST_MARKER: Lazy<Regex> = Lazy::new(|| compile(r"(?m)^[ \t]*(?:[-*•]|\d+\.)[ \t]+"));
static RE_URL: Lazy<Regex> = Lazy::new(|| compile(r"(?i)https?://\S+|\bwww\.\S+"));
static RE_NON_PRINTABLE: Lazy<Regex> = Lazy::new(|| compile(r"[\p{C}\p{Z}]"));
static RE_EMOJI: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"[\p{Extended_Pictographic}\p{Emoji_Presentation}\p{Regional_Indicator}\x{FE00}-\x{FE0F}\x{20E3}]",
    )
});
static RE_SYMBOL: Lazy<Regex> = Lazy::new(|| compile(r#"[[\p{S}\p{P}]&&[^.,!?;:()'"\-]]"#));
static RE_OUTSIDE_WHITELIST: Lazy<Regex> = Lazy::new(|| compile(r#"[^A-Za-z0-9 .,!?;:()'"\-]"#));
static RE_SQL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(r"(?i)\b(?:{})\b", SQL_KEYWORDS.join("|")))
});
static RE_SPACES: Lazy<Regex> = Lazy::new(|| compile(r"\s+"));

// ─────────────────────────────────────────────────────────────────────────────
// Steps
// ─────────────────────────────────────────────────────────────────────────────

/// `Some` only when a rewrite actually produced new text.
fn changed(result: Cow<'_, str>) -> Option<String> {
    match result {
        Cow::Owned(s) => Some(s),
        Cow::Borrowed(_) => None,
    }
}

fn chain<'a>(text: Cow<'a, str>, re: &Regex, replacement: &str) -> Cow<'a, str> {
    match changed(re.replace_all(&text, replacement)) {
        Some(s) => Cow::Owned(s),
        None => text,
    }
}

pub fn strip_markup(text: &str) -> Cow<'_, str> {
    let text = RE_SCRIPT_BLOCK.replace_all(text, " ");
    chain(text, &RE_MARKUP_TAG, " ")
}

pub fn strip_script_handlers(text: &str) -> Cow<'_, str> {
    let text = RE_JS_PROTOCOL.replace_all(text, " ");
    chain(text, &RE_EVENT_HANDLER, " ")
}

/// Replace markdown syntax with the text it wraps.
pub fn unwrap_markdown(text: &str) -> Cow<'_, str> {
    let patterns: [(&Regex, &str); 10] = [
        (&RE_MD_CODE_FENCE, " ${1} "),
        (&RE_MD_INLINE_CODE, "${1}"),
        (&RE_MD_LINK, "${1}"),
        (&RE_MD_BOLD, "${1}"),
        (&RE_MD_BOLD_UNDERSCORE, "${1}"),
        (&RE_MD_STRIKE, "${1}"),
        (&RE_MD_ITALIC, "${1}"),
        (&RE_MD_ITALIC_UNDERSCORE, "${1}"),
        (&RE_MD_HEADING, ""),
        (&RE_MD_BLOCKQUOTE, ""),
    ];

    patterns
        .into_iter()
        .fold(Cow::Borrowed(text), |out, (re, replacement)| chain(out, re, replacement))
}

pub fn strip_list_markers(text: &str) -> Cow<'_, str> {
    RE_LIST_MARKER.replace_all(text, "")
}

pub fn strip_urls(text: &str) -> Cow<'_, str> {
    RE_URL.replace_all(text, " ")
}

/// Control, format, private-use and separator characters become plain spaces.
pub fn strip_non_printable(text: &str) -> Cow<'_, str> {
    RE_NON_PRINTABLE.replace_all(text, " ")
}

/// Smart quotes → `'`, dashes → `-`, `…` → `...`.
pub fn normalize_typography(text: &str) -> Cow<'_, str> {
    let needs_work = text.chars().any(|c| typographic_replacement(c).is_some());
    if !needs_work {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match typographic_replacement(c) {
            Some(rep) => out.push_str(rep),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn typographic_replacement(c: char) -> Option<&'static str> {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{201C}'
        | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => Some("'"),
        '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' => Some("-"),
        '\u{2026}' => Some("..."),
        _ => None,
    }
}

pub fn strip_emoji(text: &str) -> Cow<'_, str> {
    RE_EMOJI.replace_all(text, " ")
}

/// Symbols and punctuation outside the whitelist become spaces so the words
/// around them stay apart (`and/or` → `and or`).
pub fn strip_symbols(text: &str) -> Cow<'_, str> {
    RE_SYMBOL.replace_all(text, " ")
}

pub fn apply_whitelist(text: &str) -> Cow<'_, str> {
    RE_OUTSIDE_WHITELIST.replace_all(text, "")
}

pub fn strip_sql_keywords(text: &str) -> Cow<'_, str> {
    RE_SQL_KEYWORD.replace_all(text, "")
}

/// Collapse runs of the same punctuation mark to one. Runs of three or more
/// periods become exactly `...`.
pub fn collapse_punctuation_runs(text: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut changed = false;

    while let Some(c) = chars.next() {
        if !is_whitelisted_punctuation(c) {
            out.push(c);
            continue;
        }
        let mut run = 1usize;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        if c == '.' && run >= 3 {
            out.push_str("...");
            changed |= run != 3;
        } else {
            out.push(c);
            changed |= run > 1;
        }
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

fn is_whitelisted_punctuation(c: char) -> bool {
    matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '(' | ')' | '\'' | '"' | '-')
}

pub fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    let collapsed = RE_SPACES.replace_all(text, " ");
    let trimmed = collapsed.trim();
    if trimmed == text {
        return Cow::Borrowed(text);
    }
    Cow::Owned(trimmed.to_string())
}

/// One named sanitizer rule.
#[derive(Clone, Copy)]
pub struct SanitizeStep {
    pub name: &'static str,
    pub apply: fn(&str) -> Cow<'_, str>,
    /// Only runs when [`SanitizeOptions::strip_sql_keywords`] is set.
    pub keyword_filter: bool,
}

impl std::fmt::Debug for SanitizeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanitizeStep").field("name", &self.name).finish_non_exhaustive()
    }
}

const fn step(name: &'static str, apply: fn(&str) -> Cow<'_, str>) -> SanitizeStep {
    SanitizeStep { name, apply, keyword_filter: false }
}

/// The sanitizer, in execution order.
///
/// Markdown and list markers run while line breaks still exist; the keyword
/// filter runs after the whitelist so removed characters cannot glue a
/// keyword back together.
pub const SANITIZE_STEPS: &[SanitizeStep] = &[
    step("strip_markup", strip_markup),
    step("strip_script_handlers", strip_script_handlers),
    step("unwrap_markdown", unwrap_markdown),
    step("strip_list_markers", strip_list_markers),
    step("strip_urls", strip_urls),
    step("strip_non_printable", strip_non_printable),
    step("normalize_typography", normalize_typography),
    step("strip_emoji", strip_emoji),
    step("strip_symbols", strip_symbols),
    step("apply_whitelist", apply_whitelist),
    SanitizeStep { name: "strip_sql_keywords", apply: strip_sql_keywords, keyword_filter: true },
    step("collapse_punctuation_runs", collapse_punctuation_runs),
    step("collapse_whitespace", collapse_whitespace),
];

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Sanitizer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Truncate the result to this many characters. `None` or `Some(0)`
    /// leaves the length unbounded.
    pub max_length: Option<usize>,
    /// Remove [`SQL_KEYWORDS`] as bare words.
    pub strip_sql_keywords: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            max_length: Some(DEFAULT_MAX_LENGTH),
            strip_sql_keywords: true,
        }
    }
}

impl SanitizeOptions {
    pub fn unbounded() -> Self {
        Self {
            max_length: None,
            ..Self::default()
        }
    }
}

/// Sanitize `text` with the default keyword filter.
///
/// `max_length` of `None` skips truncation.
pub fn sanitize(text: &str, max_length: Option<usize>) -> String {
    sanitize_with(
        text,
        &SanitizeOptions {
            max_length,
            ..SanitizeOptions::default()
        },
    )
}

/// Sanitize `text`. Never fails; the worst case is an empty string.
pub fn sanitize_with(text: &str, opts: &SanitizeOptions) -> String {
    let settled = settle(text, opts);

    match opts.max_length {
        Some(max) if max > 0 && settled.chars().count() > max => {
            let truncated: String = settled.chars().take(max).collect();
            // A cut can expose a keyword or a trailing space.
            settle(&truncated, opts)
        }
        _ => settled,
    }
}

fn run_steps(text: &str, opts: &SanitizeOptions) -> String {
    let mut out = text.to_string();
    for step in SANITIZE_STEPS {
        if step.keyword_filter && !opts.strip_sql_keywords {
            continue;
        }
        if let Some(next) = changed((step.apply)(&out)) {
            out = next;
        }
    }
    out
}

/// Run the steps until the text is stable. After the first pass the text is
/// whitelisted ASCII and every step can only shorten it, so this terminates.
fn settle(text: &str, opts: &SanitizeOptions) -> String {
    let mut current = run_steps(text, opts);
    loop {
        let next = run_steps(&current, opts);
        if next == current {
            return current;
        }
        current = next;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
