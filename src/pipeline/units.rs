//! Translation units: blocks merged or split into provider-sized spans.
//!
//! ## Merge rule
//!
//! Consecutive blocks (ranks differ by one) in the same column are one unit
//! when the earlier block stops mid-sentence, e.g. a paragraph continued
//! across a page-header gap or split by the detector at a font change.
//!
//! ## Split rule
//!
//! A block longer than `max_unit_chars` is cut at line ends that close a
//! sentence. Each part keeps the union of its own lines as its region so it
//! is fitted independently. Parts never merge with anything.
//!
//! Protected spans are computed last, on each unit's final text, so a merge
//! or split can never cut through one.

use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::geometry::Rect;
use crate::lang::Language;
use crate::page::{join_words, BlockLabel, TextBlock, Word};
use crate::pipeline::mask::{ProtectedSpan, SpanFinder};
use serde::{Deserialize, Serialize};

/// Text sent to the provider as one item, with the geometry it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Page-scoped id, in reading order.
    pub id: usize,
    pub page_index: usize,
    /// Blocks covered, in reading order.
    pub block_ids: Vec<usize>,
    /// Part index within a split block, 0 otherwise.
    pub part: usize,
    pub text: String,
    /// Regions the translated text flows through, in order.
    pub regions: Vec<Rect>,
    pub font_size: f32,
    pub bold: bool,
    /// Text colour of the first block, reused when drawing the translation.
    pub color: [u8; 3],
    pub rank: usize,
    pub column: Option<usize>,
    pub label: BlockLabel,
    /// `None` flips each unit to the opposite of its detected language.
    pub target_lang: Option<Language>,
    pub protected: Vec<ProtectedSpan>,
}

impl TranslationUnit {
    /// Formula blocks are carried through untranslated.
    pub fn is_translatable(&self) -> bool {
        self.label.is_translatable()
    }

    /// Union of all regions.
    pub fn bbox(&self) -> Option<Rect> {
        Rect::union_all(self.regions.iter())
    }
}

/// Builds units for one page.
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    max_unit_chars: usize,
    target_lang: Option<Language>,
    spans: SpanFinder,
}

/// A block, or one part of a split block, before merging.
struct Piece<'a> {
    block: &'a TextBlock,
    part: usize,
    split: bool,
    text: String,
    region: Rect,
}

impl UnitBuilder {
    pub fn new(config: &TranslationConfig) -> Result<Self, TranslateError> {
        let spans = SpanFinder::new(&config.mask)
            .map_err(|e| TranslateError::InvalidConfig(format!("pass-through pattern: {e}")))?;
        Ok(Self {
            max_unit_chars: config.max_unit_chars.max(1),
            target_lang: config.target_lang,
            spans,
        })
    }

    /// Turn reading-ordered blocks into units.
    pub fn build(&self, page_index: usize, blocks: &[TextBlock]) -> Vec<TranslationUnit> {
        let mut ordered: Vec<&TextBlock> = blocks.iter().collect();
        ordered.sort_by_key(|b| b.rank);

        let pieces: Vec<Piece<'_>> = ordered.into_iter().flat_map(|b| self.split(b)).collect();

        let mut units: Vec<TranslationUnit> = Vec::new();
        let mut prev: Option<&Piece<'_>> = None;
        for piece in &pieces {
            let merge = prev.is_some_and(|p| can_merge(p, piece));
            match units.last_mut() {
                Some(unit) if merge => {
                    unit.block_ids.push(piece.block.id);
                    unit.text.push(' ');
                    unit.text.push_str(&piece.text);
                    unit.regions.push(piece.region);
                    unit.font_size = unit.font_size.min(piece.block.font_size);
                }
                _ => units.push(TranslationUnit {
                    id: units.len(),
                    page_index,
                    block_ids: vec![piece.block.id],
                    part: piece.part,
                    text: piece.text.clone(),
                    regions: vec![piece.region],
                    font_size: piece.block.font_size,
                    bold: piece.block.is_bold(),
                    color: piece.block.color,
                    rank: piece.block.rank,
                    column: piece.block.column,
                    label: piece.block.label,
                    target_lang: self.target_lang,
                    protected: Vec::new(),
                }),
            }
            prev = Some(piece);
        }

        for unit in &mut units {
            unit.protected = self.spans.find(&unit.text);
        }
        units
    }

    fn split<'a>(&self, block: &'a TextBlock) -> Vec<Piece<'a>> {
        let text = block.text();
        if text.chars().count() <= self.max_unit_chars {
            return vec![Piece {
                block,
                part: 0,
                split: false,
                text,
                region: block.bbox,
            }];
        }

        let lines = block.lines();
        let line_len = |l: &Vec<&Word>| l.iter().map(|w| w.text.chars().count() + 1).sum::<usize>();

        let mut parts: Vec<Vec<Vec<&Word>>> = Vec::new();
        let mut current: Vec<Vec<&Word>> = Vec::new();
        let mut current_len = 0usize;
        // Number of leading lines of `current` that end on a sentence.
        let mut last_break: Option<usize> = None;

        for line in lines {
            let len = line_len(&line);
            if let Some(k) = last_break.filter(|_| current_len + len > self.max_unit_chars) {
                let rest = current.split_off(k);
                parts.push(std::mem::replace(&mut current, rest));
                current_len = current.iter().map(line_len).sum();
                last_break = current
                    .iter()
                    .rposition(|l| line_ends_sentence(l))
                    .map(|i| i + 1);
            }
            let closes = line_ends_sentence(&line);
            current.push(line);
            current_len += len;
            if closes {
                last_break = Some(current.len());
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }

        let split = parts.len() > 1;
        parts
            .into_iter()
            .enumerate()
            .filter_map(|(part, lines)| {
                let words: Vec<Word> = lines.into_iter().flatten().cloned().collect();
                let region = Rect::union_all(words.iter().map(|w| &w.bbox))?;
                Some(Piece {
                    block,
                    part,
                    split,
                    text: join_words(&words),
                    region,
                })
            })
            .collect()
    }
}

fn can_merge(prev: &Piece<'_>, next: &Piece<'_>) -> bool {
    !prev.split
        && !next.split
        && prev.block.column == next.block.column
        && next.block.rank == prev.block.rank + 1
        && prev.block.label == next.block.label
        && !ends_sentence(&prev.text)
}

fn line_ends_sentence(line: &[&Word]) -> bool {
    line.last().is_some_and(|w| ends_sentence(&w.text))
}

/// Whether `text` ends in `. ! ? । ॥`, optionally followed by closing
/// quotes or brackets.
pub fn ends_sentence(text: &str) -> bool {
    let trimmed = text
        .trim_end()
        .trim_end_matches(['"', '\'', '”', '’', ')', ']', '}', '»']);
    trimmed.ends_with(['.', '!', '?', '।', '॥'])
}
