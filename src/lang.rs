//! The two supported languages and script-based detection.
//!
//! Detection counts Devanagari code points (U+0900–U+097F) against ASCII
//! Latin letters. Pages routinely mix both scripts, so detection runs per
//! translation unit, never per page.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hindi,
    English,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Hindi => "hi",
            Language::English => "en",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Hindi => "Hindi",
            Language::English => "English",
        }
    }

    pub fn opposite(&self) -> Language {
        match self {
            Language::Hindi => Language::English,
            Language::English => Language::Hindi,
        }
    }

    /// Script the language is written in.
    pub fn script(&self) -> Script {
        match self {
            Language::Hindi => Script::Devanagari,
            Language::English => Script::Latin,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hi" | "hin" | "hindi" => Ok(Language::Hindi),
            "en" | "eng" | "english" => Ok(Language::English),
            other => Err(format!("unsupported language '{other}' (expected hi or en)")),
        }
    }
}

/// Writing system of a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Latin,
    Devanagari,
}

pub fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

/// Language of the dominant script, `None` when the text has no letters
/// of either script (numbers, punctuation) or a tie.
pub fn detect(text: &str) -> Option<Language> {
    let (mut dev, mut lat) = (0usize, 0usize);
    for c in text.chars() {
        if is_devanagari(c) {
            dev += 1;
        } else if c.is_ascii_alphabetic() {
            lat += 1;
        }
    }
    match dev.cmp(&lat) {
        std::cmp::Ordering::Greater => Some(Language::Hindi),
        std::cmp::Ordering::Less => Some(Language::English),
        std::cmp::Ordering::Equal => None,
    }
}

/// Dominant script of `text`, defaulting to Latin.
pub fn dominant_script(text: &str) -> Script {
    match detect(text) {
        Some(Language::Hindi) => Script::Devanagari,
        _ => Script::Latin,
    }
}

/// Resolve the `(source, target)` pair for one unit.
///
/// * A configured source wins over detection.
/// * An unset target is the opposite of the source.
/// * When nothing can be determined the pair defaults to Hindi → English.
///
/// The returned source is `None` when the provider should auto-detect.
pub fn resolve_pair(
    text: &str,
    source: Option<Language>,
    target: Option<Language>,
) -> (Option<Language>, Language) {
    let detected = source.or_else(|| detect(text));
    match (detected, target) {
        (Some(s), Some(t)) => (Some(s), t),
        (Some(s), None) => (Some(s), s.opposite()),
        (None, Some(t)) => (None, t),
        (None, None) => (Some(Language::Hindi), Language::English),
    }
}
