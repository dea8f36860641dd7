//! Non-translatable span protection.
//!
//! Numbers, URLs, e-mail addresses and pass-through matches are swapped for
//! numbered placeholders `⟦n⟧` before a unit leaves for the provider, and
//! swapped back afterwards:
//!
//! ```text
//! "Call 555-1234 now"  ──mask──▶  "Call ⟦0⟧ now"
//! "अभी ⟦ 0 ⟧ पर कॉल करें"  ──unmask──▶  "अभी 555-1234 पर कॉल करें"
//! ```
//!
//! Providers sometimes pad placeholders with spaces or drop them; restoration
//! tolerates the former and re-inserts the latter at the same relative
//! offset, so protected text always survives byte-for-byte.

use crate::config::MaskParams;
use crate::error::MaskingError;
use crate::lang::is_devanagari;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_OPEN: char = '⟦';
pub const PLACEHOLDER_CLOSE: char = '⟧';

static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"]*[^\s<>".,;:!?'")\]।]"#).unwrap()
});

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,:/-]*\d|\d").unwrap());

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"⟦\s*(\d+)\s*⟧").unwrap());

/// What a protected span holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Url,
    Email,
    PassThrough,
    Number,
}

/// Byte range `[start, end)` of the unit text that must not be translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedSpan {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
}

/// Finds protected spans in unit text.
#[derive(Debug, Clone)]
pub struct SpanFinder {
    params: MaskParams,
    pass_through: Vec<Regex>,
}

impl SpanFinder {
    /// Compile the pass-through patterns. The config builder has already
    /// validated them.
    pub fn new(params: &MaskParams) -> Result<Self, regex::Error> {
        let pass_through = params
            .pass_through
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            params: params.clone(),
            pass_through,
        })
    }

    /// Non-overlapping spans sorted by start. When candidates overlap, URLs
    /// beat e-mails, which beat pass-through matches, which beat numbers.
    pub fn find(&self, text: &str) -> Vec<ProtectedSpan> {
        let mut candidates: Vec<ProtectedSpan> = Vec::new();
        let mut collect = |re: &Regex, kind: SpanKind| {
            candidates.extend(re.find_iter(text).filter(|m| !m.is_empty()).map(|m| {
                ProtectedSpan {
                    start: m.start(),
                    end: m.end(),
                    kind,
                }
            }));
        };
        if self.params.urls {
            collect(&RE_URL, SpanKind::Url);
        }
        if self.params.emails {
            collect(&RE_EMAIL, SpanKind::Email);
        }
        for re in &self.pass_through {
            collect(re, SpanKind::PassThrough);
        }
        if self.params.numbers {
            collect(&RE_NUMBER, SpanKind::Number);
        }

        let mut accepted: Vec<ProtectedSpan> = Vec::new();
        for c in candidates {
            if accepted.iter().all(|a| c.end <= a.start || c.start >= a.end) {
                accepted.push(c);
            }
        }
        accepted.sort_by_key(|s| s.start);
        accepted
    }
}

/// Unit text with protected spans replaced by placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Masked {
    pub text: String,
    /// Original text of placeholder `n`.
    pub originals: Vec<String>,
    /// Relative position (0..=1, by chars) of each placeholder in `text`.
    offsets: Vec<f32>,
}

impl Masked {
    /// Text that needs no masking at all.
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            originals: Vec::new(),
            offsets: Vec::new(),
        }
    }
}

/// Replace `spans` in `text` with `⟦0⟧`, `⟦1⟧`, ...
///
/// Fails with [`MaskingError::Collision`] when the text already contains a
/// placeholder delimiter; the caller then sends the text unmasked.
pub fn mask(text: &str, spans: &[ProtectedSpan]) -> Result<Masked, MaskingError> {
    if let Some(marker) = text
        .chars()
        .find(|&c| c == PLACEHOLDER_OPEN || c == PLACEHOLDER_CLOSE)
    {
        return Err(MaskingError::Collision { marker });
    }

    let mut out = String::with_capacity(text.len());
    let mut originals = Vec::with_capacity(spans.len());
    let mut starts = Vec::with_capacity(spans.len());
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor || span.end > text.len() || span.start >= span.end {
            continue;
        }
        let (Some(before), Some(original)) =
            (text.get(cursor..span.start), text.get(span.start..span.end))
        else {
            continue;
        };
        out.push_str(before);
        starts.push(out.chars().count());
        out.push(PLACEHOLDER_OPEN);
        out.push_str(&originals.len().to_string());
        out.push(PLACEHOLDER_CLOSE);
        originals.push(original.to_string());
        cursor = span.end;
    }
    out.push_str(text.get(cursor..).unwrap_or_default());

    let total = out.chars().count().max(1) as f32;
    let offsets = starts.into_iter().map(|s| s as f32 / total).collect();
    Ok(Masked {
        text: out,
        originals,
        offsets,
    })
}

/// Put the protected text back into a translation of `masked.text`.
pub fn unmask(translated: &str, masked: &Masked) -> String {
    if masked.originals.is_empty() {
        return translated.to_string();
    }

    let mut seen = vec![false; masked.originals.len()];
    let mut restored = RE_PLACEHOLDER
        .replace_all(translated, |caps: &regex::Captures<'_>| {
            match caps[1].parse::<usize>().ok().and_then(|n| {
                let original = masked.originals.get(n)?;
                seen[n] = true;
                Some(original.as_str())
            }) {
                Some(original) => original.to_string(),
                // A placeholder we never issued.
                None => String::new(),
            }
        })
        .into_owned();

    let mut missing: Vec<usize> = (0..seen.len()).filter(|&i| !seen[i]).collect();
    missing.sort_by(|&a, &b| masked.offsets[a].total_cmp(&masked.offsets[b]));
    for i in missing {
        insert_at_offset(&mut restored, &masked.originals[i], masked.offsets[i]);
    }
    restored
}

/// Insert `piece` near `frac` of the way through `text`, on a word boundary.
fn insert_at_offset(text: &mut String, piece: &str, frac: f32) {
    let chars = text.chars().count();
    let target = (frac.clamp(0.0, 1.0) * chars as f32).round() as usize;

    // Byte positions that sit at a word boundary, with their char index.
    let boundaries: Vec<(usize, usize)> = std::iter::once((0, 0))
        .chain(
            text.char_indices()
                .enumerate()
                .filter(|(_, (_, c))| c.is_whitespace())
                .map(|(ci, (bi, c))| (ci + 1, bi + c.len_utf8())),
        )
        .chain(std::iter::once((chars, text.len())))
        .map(|(ci, bi)| (bi, ci))
        .collect();

    let Some(&(pos, _)) = boundaries
        .iter()
        .min_by_key(|(_, ci)| ci.abs_diff(target))
    else {
        text.push_str(piece);
        return;
    };

    if pos >= text.len() {
        if !text.is_empty() && !text.ends_with(char::is_whitespace) {
            text.push(' ');
        }
        text.push_str(piece);
    } else {
        text.insert(pos, ' ');
        text.insert_str(pos, piece);
    }
}

/// `true` when nothing outside `spans` is worth translating: only
/// whitespace, punctuation, digits and symbols remain.
pub fn is_protected_only(text: &str, spans: &[ProtectedSpan]) -> bool {
    let mut cursor = 0;
    let mut rest = String::new();
    for s in spans {
        if s.start >= cursor {
            rest.push_str(text.get(cursor..s.start).unwrap_or_default());
            cursor = s.end;
        }
    }
    rest.push_str(text.get(cursor..).unwrap_or_default());
    !rest.chars().any(is_content_char)
}

fn is_content_char(c: char) -> bool {
    if c.is_numeric() || c == '।' || c == '॥' {
        return false;
    }
    c.is_alphabetic() || is_devanagari(c)
}
