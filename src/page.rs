//! Per-page data model: glyphs, words, blocks, units and rendered blocks.
//!
//! A [`PageModel`] is created when a page is loaded, mutated by each
//! pipeline stage in turn (layout → units → translation → reassembly) and
//! finally reduced to a [`crate::output::PageOutput`]. It is owned by exactly
//! one worker for its whole life; nothing in it is shared across pages.
//!
//! Pages are read through the [`PageSource`] trait. pdfium-backed pages are
//! read by `pipeline::pdf::PdfPageSource` inside `spawn_blocking` (pdfium
//! handles are not `Send`); tests and OCR callers build [`MemoryPage`]s
//! directly. Either way the result is a [`PageInput`] the orchestrator owns.

use crate::error::PageError;
use crate::geometry::Rect;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Glyphs and words ─────────────────────────────────────────────────────

/// One character as reported by the text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub ch: char,
    pub bbox: Rect,
    pub font_size: f32,
    pub bold: bool,
    /// Fill colour as 8-bit RGB.
    #[serde(default)]
    pub color: [u8; 3],
}

/// A whitespace-delimited run of glyphs on one line. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Position in native document order.
    pub id: usize,
    pub text: String,
    pub bbox: Rect,
    pub font_size: f32,
    /// Bottom edge of the glyph boxes.
    pub baseline: f32,
    pub bold: bool,
    /// Most common glyph colour.
    pub color: [u8; 3],
}

// ── Blocks ───────────────────────────────────────────────────────────────

/// Semantic class of a block. The heuristic detector only emits
/// `Paragraph`; learned models report richer labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLabel {
    #[default]
    Paragraph,
    Title,
    SectionHeader,
    ListItem,
    Table,
    Caption,
    Footnote,
    PageHeader,
    PageFooter,
    Picture,
    Formula,
}

impl BlockLabel {
    /// Parse a model label, tolerating case and separators.
    pub fn parse(label: &str) -> BlockLabel {
        let norm: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "title" => BlockLabel::Title,
            "sectionheader" | "heading" | "header" => BlockLabel::SectionHeader,
            "listitem" | "list" => BlockLabel::ListItem,
            "table" => BlockLabel::Table,
            "caption" => BlockLabel::Caption,
            "footnote" => BlockLabel::Footnote,
            "pageheader" => BlockLabel::PageHeader,
            "pagefooter" => BlockLabel::PageFooter,
            "picture" | "figure" | "image" => BlockLabel::Picture,
            "formula" | "equation" => BlockLabel::Formula,
            _ => BlockLabel::Paragraph,
        }
    }

    /// Whether text in this block goes to the translation provider.
    pub fn is_translatable(&self) -> bool {
        !matches!(self, BlockLabel::Formula)
    }
}

/// A detected group of words forming one layout unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Page-scoped id, stable across the pipeline.
    pub id: usize,
    /// Words in reading order within the block.
    pub words: Vec<Word>,
    pub bbox: Rect,
    /// Column index, or `None` for a full-width band.
    pub column: Option<usize>,
    /// Reading-order rank: a permutation of `0..n` over the page's blocks.
    pub rank: usize,
    pub label: BlockLabel,
    /// Median word font size.
    pub font_size: f32,
    /// Most common word colour.
    pub color: [u8; 3],
}

impl TextBlock {
    /// Assemble a block from words already in reading order.
    /// Returns `None` when `words` is empty.
    pub fn from_words(words: Vec<Word>, column: Option<usize>, label: BlockLabel) -> Option<Self> {
        let bbox = Rect::union_all(words.iter().map(|w| &w.bbox))?;
        let font_size = median(words.iter().map(|w| w.font_size));
        let color = dominant_color(words.iter().map(|w| w.color));
        Some(Self {
            id: 0,
            words,
            bbox,
            column,
            rank: 0,
            label,
            font_size,
            color,
        })
    }

    /// Words joined with single spaces; line breaks become spaces.
    pub fn text(&self) -> String {
        join_words(&self.words)
    }

    /// Split into visual lines: a new line starts whenever a word begins
    /// left of the previous word's end and below its vertical centre.
    pub fn lines(&self) -> Vec<Vec<&Word>> {
        let mut lines: Vec<Vec<&Word>> = Vec::new();
        for w in &self.words {
            let new_line = match lines.last().and_then(|l| l.last()) {
                None => true,
                Some(prev) => w.bbox.x0 < prev.bbox.x1 && w.bbox.y0 >= prev.bbox.center_y(),
            };
            if new_line {
                lines.push(vec![w]);
            } else if let Some(l) = lines.last_mut() {
                l.push(w);
            }
        }
        lines
    }

    pub fn is_bold(&self) -> bool {
        let bold = self.words.iter().filter(|w| w.bold).count();
        bold * 2 > self.words.len()
    }
}

pub(crate) fn join_words(words: &[Word]) -> String {
    let mut out = String::new();
    for w in words {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&w.text);
    }
    out
}

/// The colour seen most often; black when there is none. Ties go to the
/// smallest RGB triple so the choice does not depend on input order.
pub(crate) fn dominant_color(colors: impl Iterator<Item = [u8; 3]>) -> [u8; 3] {
    let mut counts: BTreeMap<[u8; 3], usize> = BTreeMap::new();
    for c in colors {
        *counts.entry(c).or_default() += 1;
    }
    counts
        .into_iter()
        .fold(None, |best: Option<([u8; 3], usize)>, (c, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((c, n)),
        })
        .map(|(c, _)| c)
        .unwrap_or_default()
}

pub(crate) fn median(values: impl Iterator<Item = f32>) -> f32 {
    let mut v: Vec<f32> = values.filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    v[v.len() / 2]
}

// ── Page sources ─────────────────────────────────────────────────────────

/// Anything that can hand over a page's text layer.
pub trait PageSource {
    /// 0-indexed page number within the document.
    fn page_index(&self) -> usize;

    /// Page width and height in PDF points.
    fn size(&self) -> (f32, f32);

    /// Glyphs in native document order.
    fn glyphs(&self) -> Vec<Glyph>;

    /// Rendered page for the learned layout detector, when the source has one.
    fn raster(&self) -> Option<DynamicImage> {
        None
    }
}

/// Page held entirely in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPage {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub glyphs: Vec<Glyph>,
    /// Colour given to glyphs added by `push_word` and `push_line`.
    #[serde(default)]
    pub pen: [u8; 3],
    #[serde(skip)]
    pub raster: Option<DynamicImage>,
}

impl MemoryPage {
    pub fn new(index: usize, width: f32, height: f32) -> Self {
        Self {
            index,
            width,
            height,
            glyphs: Vec::new(),
            pen: [0, 0, 0],
            raster: None,
        }
    }

    /// Colour for the glyphs pushed after this call.
    pub fn set_pen(&mut self, rgb: [u8; 3]) -> &mut Self {
        self.pen = rgb;
        self
    }

    /// Attach a rendered image of the page.
    pub fn with_raster(mut self, raster: DynamicImage) -> Self {
        self.raster = Some(raster);
        self
    }

    /// Append a word by spreading its characters evenly over `bbox`,
    /// followed by a zero-width space glyph.
    pub fn push_word(&mut self, text: &str, bbox: Rect, font_size: f32) -> &mut Self {
        let n = text.chars().count().max(1) as f32;
        let step = bbox.width() / n;
        for (i, ch) in text.chars().enumerate() {
            let x0 = bbox.x0 + step * i as f32;
            self.glyphs.push(Glyph {
                ch,
                bbox: Rect::new(x0, bbox.y0, x0 + step, bbox.y1),
                font_size,
                bold: false,
                color: self.pen,
            });
        }
        self.glyphs.push(Glyph {
            ch: ' ',
            bbox: Rect::new(bbox.x1, bbox.y0, bbox.x1, bbox.y1),
            font_size,
            bold: false,
            color: self.pen,
        });
        self
    }

    /// Lay out `text` as a run of words starting at `(x, y)`, using a fixed
    /// advance of `0.5 em` per character and one space between words.
    pub fn push_line(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> &mut Self {
        let advance = font_size * 0.5;
        let mut cursor = x;
        for word in text.split_whitespace() {
            let w = advance * word.chars().count() as f32;
            self.push_word(word, Rect::new(cursor, y, cursor + w, y + font_size), font_size);
            cursor += w + advance;
        }
        self
    }
}

impl PageSource for MemoryPage {
    fn page_index(&self) -> usize {
        self.index
    }

    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn glyphs(&self) -> Vec<Glyph> {
        self.glyphs.clone()
    }

    fn raster(&self) -> Option<DynamicImage> {
        self.raster.clone()
    }
}

/// A loaded page as handed to the orchestrator.
///
/// `model` is the extraction outcome; a page without a text layer still
/// carries its size so it can be reported and, with an overlay map, drawn on.
#[derive(Debug, Clone)]
pub struct PageInput {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub model: Result<PageModel, PageError>,
    /// Page raster for the learned detector and debug images.
    pub raster: Option<DynamicImage>,
}

impl PageInput {
    pub fn load(source: &impl PageSource) -> Self {
        let (width, height) = source.size();
        Self {
            index: source.page_index(),
            width,
            height,
            model: PageModel::load(source),
            raster: source.raster(),
        }
    }

    pub fn with_raster(mut self, raster: DynamicImage) -> Self {
        self.raster = Some(raster);
        self
    }
}

// ── Page model ───────────────────────────────────────────────────────────

/// Where a page's blocks came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutSource {
    #[default]
    Heuristic,
    Learned,
    /// Learned model unavailable for this page; heuristic output used.
    HeuristicFallback,
    /// Placements taken verbatim from the overlay map.
    OverlayMap,
    /// Nothing was laid out (no text layer, invalid map, cancelled).
    None,
}

/// Everything the pipeline knows about one page.
#[derive(Debug, Clone)]
pub struct PageModel {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    words: Vec<Word>,
    pub blocks: Vec<TextBlock>,
    pub units: Vec<crate::pipeline::units::TranslationUnit>,
    pub rendered: Vec<crate::pipeline::reassemble::RenderedBlock>,
    pub layout_source: LayoutSource,
}

impl PageModel {
    /// Extract words from a page's text layer.
    ///
    /// Glyphs are grouped into words on whitespace, on a jump to another
    /// line, and on horizontal gaps wider than 0.3 em. Fails with
    /// [`PageError::NoTextLayer`] when the page yields no words.
    pub fn load(source: &impl PageSource) -> Result<PageModel, PageError> {
        let (width, height) = source.size();
        let words = group_glyphs(&source.glyphs());
        if words.is_empty() {
            return Err(PageError::NoTextLayer {
                page: source.page_index() + 1,
            });
        }
        Ok(PageModel {
            index: source.page_index(),
            width,
            height,
            words,
            blocks: Vec::new(),
            units: Vec::new(),
            rendered: Vec::new(),
            layout_source: LayoutSource::Heuristic,
        })
    }

    /// A page with no words, used when placements come from elsewhere.
    pub fn blank(index: usize, width: f32, height: f32) -> PageModel {
        PageModel {
            index,
            width,
            height,
            words: Vec::new(),
            blocks: Vec::new(),
            units: Vec::new(),
            rendered: Vec::new(),
            layout_source: LayoutSource::None,
        }
    }

    /// Words in native document order. The iterator is cheap to clone and
    /// can be restarted by calling `words()` again.
    pub fn words(&self) -> std::slice::Iter<'_, Word> {
        self.words.iter()
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Page bounds as a rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

fn group_glyphs(glyphs: &[Glyph]) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Vec<&Glyph> = Vec::new();

    let flush = |current: &mut Vec<&Glyph>, words: &mut Vec<Word>| {
        if current.is_empty() {
            return;
        }
        let text: String = current.iter().map(|g| g.ch).collect();
        let bbox = current
            .iter()
            .skip(1)
            .fold(current[0].bbox, |acc, g| acc.union(&g.bbox));
        let font_size = median(current.iter().map(|g| g.font_size));
        let bold = current.iter().filter(|g| g.bold).count() * 2 > current.len();
        let color = dominant_color(current.iter().map(|g| g.color));
        words.push(Word {
            id: words.len(),
            text,
            bbox,
            font_size,
            baseline: bbox.y1,
            bold,
            color,
        });
        current.clear();
    };

    for g in glyphs {
        if g.ch.is_whitespace() || g.ch.is_control() {
            flush(&mut current, &mut words);
            continue;
        }
        if g.bbox.is_degenerate() && g.bbox.width() <= 0.0 && g.bbox.height() <= 0.0 {
            continue;
        }
        if let Some(prev) = current.last() {
            let em = prev.font_size.max(g.font_size).max(1.0);
            let line_jump = (g.bbox.center_y() - prev.bbox.center_y()).abs() > em * 0.5;
            let gap = g.bbox.x0 - prev.bbox.x1;
            if line_jump || gap > em * 0.3 || gap < -em {
                flush(&mut current, &mut words);
            }
        }
        current.push(g);
    }
    flush(&mut current, &mut words);
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_groups_glyphs_into_words() {
        let mut page = MemoryPage::new(0, 600.0, 800.0);
        page.push_line("hello brave world", 50.0, 100.0, 10.0);
        let model = PageModel::load(&page).expect("has text");
        let texts: Vec<&str> = model.words().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "brave", "world"]);
        let ids: Vec<usize> = model.words().map(|w| w.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn words_iterator_is_restartable() {
        let mut page = MemoryPage::new(0, 600.0, 800.0);
        page.push_line("a b c", 10.0, 10.0, 10.0);
        let model = PageModel::load(&page).unwrap();
        assert_eq!(model.words().count(), 3);
        assert_eq!(model.words().count(), 3);
    }

    #[test]
    fn empty_page_has_no_text_layer() {
        let page = MemoryPage::new(2, 600.0, 800.0);
        let err = PageModel::load(&page).unwrap_err();
        assert_eq!(err, PageError::NoTextLayer { page: 3 });
    }

    #[test]
    fn gap_without_space_glyph_splits_words() {
        let mut page = MemoryPage::new(0, 600.0, 800.0);
        for (i, ch) in "ab".chars().enumerate() {
            page.glyphs.push(Glyph {
                ch,
                bbox: Rect::new(10.0 + i as f32 * 5.0, 10.0, 15.0 + i as f32 * 5.0, 20.0),
                font_size: 10.0,
                bold: false,
                color: [0, 0, 0],
            });
        }
        page.glyphs.push(Glyph {
            ch: 'c',
            bbox: Rect::new(60.0, 10.0, 65.0, 20.0),
            font_size: 10.0,
            bold: false,
            color: [0, 0, 0],
        });
        let model = PageModel::load(&page).unwrap();
        let texts: Vec<&str> = model.words().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "c"]);
    }

    #[test]
    fn line_change_splits_words() {
        let mut page = MemoryPage::new(0, 600.0, 800.0);
        page.glyphs.push(Glyph {
            ch: 'x',
            bbox: Rect::new(100.0, 10.0, 105.0, 20.0),
            font_size: 10.0,
            bold: false,
            color: [0, 0, 0],
        });
        page.glyphs.push(Glyph {
            ch: 'y',
            bbox: Rect::new(105.0, 30.0, 110.0, 40.0),
            font_size: 10.0,
            bold: false,
            color: [0, 0, 0],
        });
        let model = PageModel::load(&page).unwrap();
        assert_eq!(model.word_count(), 2);
    }

    #[test]
    fn block_lines_follow_wraps() {
        let mut page = MemoryPage::new(0, 600.0, 800.0);
        page.push_line("one two", 10.0, 10.0, 10.0);
        page.push_line("three", 10.0, 22.0, 10.0);
        let model = PageModel::load(&page).unwrap();
        let block =
            TextBlock::from_words(model.words().cloned().collect(), Some(0), BlockLabel::Paragraph)
                .unwrap();
        let lines = block.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(block.text(), "one two three");
    }

    #[test]
    fn word_and_block_take_the_common_colour() {
        let mut page = MemoryPage::new(0, 600.0, 800.0);
        page.set_pen([250, 250, 250]).push_line("light text here", 10.0, 10.0, 10.0);
        page.set_pen([0, 0, 0]).push_line("dark", 10.0, 22.0, 10.0);
        let model = PageModel::load(&page).unwrap();
        let colors: Vec<[u8; 3]> = model.words().map(|w| w.color).collect();
        assert_eq!(colors, vec![[250; 3], [250; 3], [250; 3], [0; 3]]);
        let block =
            TextBlock::from_words(model.words().cloned().collect(), None, BlockLabel::Paragraph)
                .unwrap();
        assert_eq!(block.color, [250, 250, 250]);
    }

    #[test]
    fn colour_ties_are_order_independent() {
        let a = dominant_color([[9, 9, 9], [1, 1, 1]].into_iter());
        let b = dominant_color([[1, 1, 1], [9, 9, 9]].into_iter());
        assert_eq!(a, b);
        assert_eq!(dominant_color(std::iter::empty()), [0, 0, 0]);
    }

    #[test]
    fn memory_raster_reaches_page_input() {
        let mut page = MemoryPage::new(0, 60.0, 80.0);
        page.push_line("x", 10.0, 10.0, 10.0);
        assert!(PageInput::load(&page).raster.is_none());
        let page = page.with_raster(DynamicImage::new_rgb8(60, 80));
        assert_eq!(PageInput::load(&page).raster.map(|r| r.width()), Some(60));
    }

    #[test]
    fn labels_parse_loosely() {
        assert_eq!(BlockLabel::parse("Section-Header"), BlockLabel::SectionHeader);
        assert_eq!(BlockLabel::parse("FORMULA"), BlockLabel::Formula);
        assert_eq!(BlockLabel::parse("whatever"), BlockLabel::Paragraph);
        assert!(!BlockLabel::Formula.is_translatable());
    }
}
