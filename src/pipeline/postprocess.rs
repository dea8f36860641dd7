//! Post-processing: deterministic cleanup of provider output.
//!
//! Runs on the *masked* translation, before placeholders are restored, so
//! protected spans (which may legitimately contain runs of spaces or a space
//! before a colon) are never touched.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a zero-width space between two blanks
//! does not survive whitespace collapsing; punctuation spacing runs last on
//! the collapsed text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to one translated string.
///
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Collapse whitespace runs (including newlines) to one space and trim
/// 3. Remove spaces before `, . ; : ! ? ।`
pub fn normalise_translation(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = collapse_whitespace(&s);
    tighten_punctuation(&s)
}

// ── Rule 1: Invisible characters ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{2060}' | '\u{180E}'
            )
        })
        .collect()
}

// ── Rule 2: Whitespace runs ──────────────────────────────────────────────

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WS.replace_all(input.trim(), " ").into_owned()
}

// ── Rule 3: Space before punctuation ─────────────────────────────────────

static RE_SPACE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r" +([,.;:!?।])").unwrap());

fn tighten_punctuation(input: &str) -> String {
    RE_SPACE_PUNCT.replace_all(input, "$1").into_owned()
}
