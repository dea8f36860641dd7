//! Offline phrase-table provider.
//!
//! Deterministic and network-free: used for glossaries, for tests and for
//! reproducible runs. Lookup is case-insensitive and works in both
//! directions (an entry `hello → नमस्ते` also maps `नमस्ते → hello`).
//!
//! A text that matches an entry exactly is replaced whole. Otherwise the
//! text is scanned left to right for the longest known phrase at each
//! position; unknown words and placeholders pass through unchanged.

use super::BatchLimits;
use std::collections::{BTreeMap, HashMap};

pub struct DictionaryProvider {
    table: HashMap<String, String>,
    longest_phrase: usize,
}

impl DictionaryProvider {
    pub const LIMITS: BatchLimits = BatchLimits {
        max_units: 1024,
        max_chars: usize::MAX,
    };

    pub fn new(entries: &BTreeMap<String, String>) -> Self {
        let mut table = HashMap::new();
        // reverse direction first so explicit forward entries win on clashes
        for (src, tgt) in entries {
            table.entry(normalise(tgt)).or_insert_with(|| src.clone());
        }
        for (src, tgt) in entries {
            table.insert(normalise(src), tgt.clone());
        }
        let longest_phrase = table
            .keys()
            .map(|k| k.split(' ').count())
            .max()
            .unwrap_or(1);
        Self {
            table,
            longest_phrase,
        }
    }

    pub fn translate_batch(&self, texts: &[String]) -> Vec<String> {
        texts.iter().map(|t| self.translate(t)).collect()
    }

    pub fn translate(&self, text: &str) -> String {
        if let Some(hit) = self.table.get(&normalise(text)) {
            return hit.clone();
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let max = self.longest_phrase.min(tokens.len() - i);
            let hit = (1..=max).rev().find_map(|n| {
                let (lead, core, trail) = split_punct(&tokens[i..i + n]);
                self.table
                    .get(&normalise(&core))
                    .map(|t| (n, format!("{lead}{t}{trail}")))
            });
            match hit {
                Some((n, translated)) => {
                    out.push(translated);
                    i += n;
                }
                None => {
                    out.push(tokens[i].to_string());
                    i += 1;
                }
            }
        }
        out.join(" ")
    }
}

fn normalise(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_edge_punct(c: char) -> bool {
    c.is_ascii_punctuation() || matches!(c, '।' | '॥' | '“' | '”' | '‘' | '’')
}

/// Join `tokens` and peel leading/trailing punctuation off the phrase.
fn split_punct(tokens: &[&str]) -> (String, String, String) {
    let joined = tokens.join(" ");
    let core_start = joined
        .char_indices()
        .find(|&(_, c)| !is_edge_punct(c))
        .map(|(i, _)| i)
        .unwrap_or(joined.len());
    let core_end = joined
        .char_indices()
        .rev()
        .find(|&(_, c)| !is_edge_punct(c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(core_start)
        .max(core_start);
    (
        joined[..core_start].to_string(),
        joined[core_start..core_end].to_string(),
        joined[core_end..].to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> DictionaryProvider {
        let mut e = BTreeMap::new();
        e.insert("hello".to_string(), "नमस्ते".to_string());
        e.insert("good morning".to_string(), "सुप्रभात".to_string());
        e.insert("call".to_string(), "कॉल करें".to_string());
        DictionaryProvider::new(&e)
    }

    #[test]
    fn exact_match_case_insensitive() {
        assert_eq!(dict().translate("Hello"), "नमस्ते");
    }

    #[test]
    fn reverse_direction() {
        assert_eq!(dict().translate("नमस्ते"), "hello");
    }

    #[test]
    fn longest_phrase_wins_and_punctuation_kept() {
        assert_eq!(dict().translate("Good morning, friend"), "सुप्रभात, friend");
    }

    #[test]
    fn unknown_words_and_placeholders_pass_through() {
        assert_eq!(dict().translate("Call ⟦0⟧ now"), "कॉल करें ⟦0⟧ now");
    }

    #[test]
    fn deterministic() {
        let d = dict();
        assert_eq!(d.translate("hello hello"), d.translate("hello hello"));
    }
}
