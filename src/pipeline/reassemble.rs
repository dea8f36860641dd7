//! Put translated text back onto the page.
//!
//! ## Modes
//!
//! | Mode    | Erase original | Font size                                  |
//! |---------|----------------|--------------------------------------------|
//! | Overlay | no             | source size clamped to `[min, max]`        |
//! | Block   | yes            | source size clamped to `[min, max]`        |
//! | Hybrid  | yes            | binary search down to `min` until it fits  |
//!
//! Text that does not fit at the final size is clipped to the lines that do
//! and the block is flagged `overflow`. A region too short for a single line
//! at the minimum size is not erased, so the source text stays readable. A
//! unit whose translation failed is drawn with its source text and flagged
//! `degraded`; a skipped unit is left exactly as it is on the page.
//!
//! Translated text keeps the source colour. Unless a fill is configured, the
//! erase fill follows the text: black behind text with relative luminance of
//! at least 0.85, white otherwise.
//!
//! Output is a list of backend-neutral [`DrawOp`]s: every erase first, then
//! every text line, in `(rank, part)` order.

use crate::config::{FitParams, ReadingDirection, RenderMode, TranslationConfig};
use crate::geometry::Rect;
use crate::lang::{dominant_script, Script};
use crate::page::PageModel;
use crate::pipeline::client::{TranslationResult, TranslationStatus};
use crate::pipeline::fit::{Fitted, Fitter};
use crate::pipeline::metrics::TextMeasurer;
use crate::pipeline::overlay::OverlayEntry;
use crate::pipeline::units::TranslationUnit;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub use crate::pipeline::fit::RenderedLine;

/// Final placement of one translation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedBlock {
    pub unit_id: usize,
    pub block_ids: Vec<usize>,
    pub rank: usize,
    pub part: usize,
    /// The full text that was placed, before clipping.
    pub text: String,
    pub lines: Vec<RenderedLine>,
    pub font_size: f32,
    /// Baseline origin of the first line.
    pub origin: (f32, f32),
    pub bbox: Rect,
    pub overflow: bool,
    /// Source text shown because translation failed.
    pub degraded: bool,
}

/// A backend-neutral page operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    /// Fill `rect` to hide the original text beneath it.
    Erase { rect: Rect, color: [u8; 3] },
    /// Draw one line of text with its baseline at `(x, baseline)`.
    Text {
        text: String,
        x: f32,
        baseline: f32,
        font_size: f32,
        script: Script,
        bold: bool,
        color: [u8; 3],
    },
}

/// Relative luminance of an 8-bit RGB colour, in `[0, 1]`.
pub fn luminance(rgb: [u8; 3]) -> f32 {
    let [r, g, b] = rgb.map(|c| c as f32 / 255.0);
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

/// Fill that hides text of colour `text`.
pub fn erase_fill_for(text: [u8; 3]) -> [u8; 3] {
    if luminance(text) >= 0.85 {
        [0, 0, 0]
    } else {
        [255, 255, 255]
    }
}

/// Lays out translated units for one run. Cheap to share across pages.
#[derive(Debug, Clone)]
pub struct PageReassembler {
    mode: RenderMode,
    fit: FitParams,
    direction: ReadingDirection,
    erase_color: Option<[u8; 3]>,
    measurer: Arc<TextMeasurer>,
}

impl PageReassembler {
    pub fn new(config: &TranslationConfig, measurer: Arc<TextMeasurer>) -> Self {
        Self {
            mode: config.render_mode,
            fit: config.fit.clone(),
            direction: config.direction,
            erase_color: config.erase_color,
            measurer,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Place `results` (one per unit in `page.units`) and return the draw
    /// operations. `page.rendered` receives the placements sorted by
    /// `(rank, part)`.
    pub fn render(&self, page: &mut PageModel, results: &[TranslationResult]) -> Vec<DrawOp> {
        let fitter = Fitter::new(&self.fit, &self.measurer, self.direction, page.bounds());
        let mut rendered = Vec::new();
        let mut erase = Vec::new();

        for (i, unit) in page.units.iter().enumerate() {
            let result = results
                .get(i)
                .filter(|r| r.unit_id == unit.id)
                .or_else(|| results.iter().find(|r| r.unit_id == unit.id));
            let Some(result) = result else {
                continue;
            };
            let degraded = match &result.status {
                TranslationStatus::Translated => false,
                TranslationStatus::Failed { .. } => true,
                TranslationStatus::Skipped => continue,
            };
            if unit.regions.is_empty() {
                continue;
            }

            let fitted = self.fit_unit(&fitter, unit, &result.text);
            if fitted.overflow {
                debug!(
                    "Page {} unit {}: {} line(s) clipped at {:.1}pt",
                    page.index + 1,
                    unit.id,
                    fitted.clipped,
                    fitted.font_size
                );
            }
            if fitted.lines.is_empty() {
                debug!(
                    "Page {} unit {}: no line fits at {:.1}pt; source left in place",
                    page.index + 1,
                    unit.id,
                    fitted.font_size
                );
            } else if self.mode != RenderMode::Overlay {
                let fill = self.erase_color.unwrap_or_else(|| erase_fill_for(unit.color));
                for r in &unit.regions {
                    erase.push((r.clamp_to(&page.bounds()), fill));
                }
            }
            rendered.push(block_from(unit, &result.text, fitted, degraded));
        }

        rendered.sort_by_key(|b| (b.rank, b.part));
        let ops = self.ops(&erase, &rendered, |b| {
            page.units
                .iter()
                .find(|u| u.id == b.unit_id)
                .map(|u| (u.bold, u.color))
                .unwrap_or((false, [0, 0, 0]))
        });
        page.rendered = rendered;
        ops
    }

    /// Place overlay-map entries verbatim. Nothing is erased; each entry is
    /// shrunk from its own font size until it fits its box.
    pub fn render_overlay(&self, page: &mut PageModel, entries: &[OverlayEntry]) -> Vec<DrawOp> {
        let fitter = Fitter::new(&self.fit, &self.measurer, self.direction, page.bounds());
        let rendered: Vec<RenderedBlock> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let fitted = fitter.shrink_to_fit(&e.text, std::slice::from_ref(&e.bbox), e.font_size);
                let bbox = fitted.bbox().unwrap_or(e.bbox);
                RenderedBlock {
                    unit_id: i,
                    block_ids: Vec::new(),
                    rank: i,
                    part: 0,
                    text: e.text.clone(),
                    origin: origin_of(&fitted, &e.bbox),
                    font_size: fitted.font_size,
                    overflow: fitted.overflow,
                    lines: fitted.lines,
                    bbox,
                    degraded: false,
                }
            })
            .collect();
        let ops = self.ops(&[], &rendered, |_| (false, [0, 0, 0]));
        page.rendered = rendered;
        ops
    }

    fn fit_unit(&self, fitter: &Fitter<'_>, unit: &TranslationUnit, text: &str) -> Fitted {
        match self.mode {
            RenderMode::Hybrid => fitter.shrink_to_fit(text, &unit.regions, unit.font_size),
            RenderMode::Block | RenderMode::Overlay => {
                fitter.place(text, &unit.regions, fitter.clamp_size(unit.font_size))
            }
        }
    }

    fn ops(
        &self,
        erase: &[(Rect, [u8; 3])],
        rendered: &[RenderedBlock],
        style: impl Fn(&RenderedBlock) -> (bool, [u8; 3]),
    ) -> Vec<DrawOp> {
        let mut ops: Vec<DrawOp> = erase
            .iter()
            .filter(|(r, _)| !r.is_degenerate())
            .map(|&(rect, color)| DrawOp::Erase { rect, color })
            .collect();
        for b in rendered {
            let (bold, color) = style(b);
            for line in &b.lines {
                ops.push(DrawOp::Text {
                    text: line.text.clone(),
                    x: line.x,
                    baseline: line.baseline,
                    font_size: b.font_size,
                    script: dominant_script(&line.text),
                    bold,
                    color,
                });
            }
        }
        ops
    }
}

fn origin_of(fitted: &Fitted, fallback: &Rect) -> (f32, f32) {
    fitted
        .lines
        .first()
        .map(|l| (l.x, l.baseline))
        .unwrap_or((fallback.x0, fallback.y0))
}

fn block_from(unit: &TranslationUnit, text: &str, fitted: Fitted, degraded: bool) -> RenderedBlock {
    let region = unit.bbox().unwrap_or_default();
    RenderedBlock {
        unit_id: unit.id,
        block_ids: unit.block_ids.clone(),
        rank: unit.rank,
        part: unit.part,
        text: text.to_string(),
        origin: origin_of(&fitted, &region),
        bbox: fitted.bbox().unwrap_or(region),
        font_size: fitted.font_size,
        overflow: fitted.overflow,
        lines: fitted.lines,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::BlockLabel;

    fn unit(id: usize, rank: usize, region: Rect, text: &str) -> TranslationUnit {
        TranslationUnit {
            id,
            page_index: 0,
            block_ids: vec![id],
            part: 0,
            text: text.to_string(),
            regions: vec![region],
            font_size: 12.0,
            bold: false,
            color: [0, 0, 0],
            rank,
            column: None,
            label: BlockLabel::Paragraph,
            target_lang: None,
            protected: Vec::new(),
        }
    }

    fn result(id: usize, text: &str, status: TranslationStatus) -> TranslationResult {
        TranslationResult {
            unit_id: id,
            text: text.to_string(),
            status,
            provider: "dictionary".into(),
            confidence: None,
            latency_ms: 0,
            detected_source: None,
            masking_skipped: false,
        }
    }

    fn reassembler(mode: RenderMode) -> PageReassembler {
        let config = TranslationConfig::builder().render_mode(mode).build().unwrap();
        PageReassembler::new(&config, Arc::new(TextMeasurer::table()))
    }

    fn page_with(units: Vec<TranslationUnit>) -> PageModel {
        let mut page = PageModel::blank(0, 600.0, 800.0);
        page.units = units;
        page
    }

    #[test]
    fn sorted_by_rank_and_erased_first() {
        let r = reassembler(RenderMode::Hybrid);
        let mut page = page_with(vec![
            unit(0, 1, Rect::new(50.0, 200.0, 300.0, 215.0), "b"),
            unit(1, 0, Rect::new(50.0, 100.0, 300.0, 115.0), "a"),
        ]);
        let results = vec![
            result(0, "second", TranslationStatus::Translated),
            result(1, "first", TranslationStatus::Translated),
        ];
        let ops = r.render(&mut page, &results);
        assert_eq!(page.rendered[0].text, "first");
        assert_eq!(page.rendered[1].text, "second");
        assert!(matches!(ops[0], DrawOp::Erase { .. }));
        assert!(matches!(ops[1], DrawOp::Erase { .. }));
        assert!(matches!(&ops[2], DrawOp::Text { text, .. } if text == "first"));
    }

    #[test]
    fn overlay_mode_does_not_erase() {
        let r = reassembler(RenderMode::Overlay);
        let mut page = page_with(vec![unit(0, 0, Rect::new(50.0, 100.0, 300.0, 115.0), "a")]);
        let ops = r.render(&mut page, &[result(0, "x", TranslationStatus::Translated)]);
        assert!(ops.iter().all(|o| matches!(o, DrawOp::Text { .. })));
    }

    #[test]
    fn failed_units_show_source_degraded() {
        let r = reassembler(RenderMode::Block);
        let mut page = page_with(vec![unit(0, 0, Rect::new(50.0, 100.0, 300.0, 115.0), "नमस्ते")]);
        let failed = TranslationStatus::Failed {
            reason: "timeout".into(),
        };
        r.render(&mut page, &[result(0, "नमस्ते", failed)]);
        assert!(page.rendered[0].degraded);
        assert_eq!(page.rendered[0].lines[0].text, "नमस्ते");
    }

    #[test]
    fn skipped_units_are_left_alone() {
        let r = reassembler(RenderMode::Hybrid);
        let mut page = page_with(vec![unit(0, 0, Rect::new(50.0, 100.0, 300.0, 115.0), "42")]);
        let ops = r.render(&mut page, &[result(0, "42", TranslationStatus::Skipped)]);
        assert!(ops.is_empty());
        assert!(page.rendered.is_empty());
    }

    #[test]
    fn block_mode_keeps_size_and_flags_overflow() {
        let r = reassembler(RenderMode::Block);
        let region = Rect::new(50.0, 100.0, 150.0, 114.0);
        let mut page = page_with(vec![unit(0, 0, region, "short")]);
        let long = "translated words ".repeat(10);
        r.render(&mut page, &[result(0, &long, TranslationStatus::Translated)]);
        let b = &page.rendered[0];
        assert_eq!(b.font_size, 12.0);
        assert!(b.overflow);
        assert!(!b.lines.is_empty());
        let allowed = region.expand(FitParams::default().overflow_tolerance);
        assert!(allowed.contains_rect(&b.bbox, 1e-3));
    }

    #[test]
    fn light_text_is_erased_with_black_and_keeps_its_colour() {
        let r = reassembler(RenderMode::Hybrid);
        let mut light = unit(0, 0, Rect::new(50.0, 100.0, 300.0, 115.0), "white");
        light.color = [250, 250, 250];
        let mut dark = unit(1, 1, Rect::new(50.0, 200.0, 300.0, 215.0), "navy");
        dark.color = [0, 0, 128];
        let mut page = page_with(vec![light, dark]);
        let ops = r.render(
            &mut page,
            &[
                result(0, "सफेद", TranslationStatus::Translated),
                result(1, "नीला", TranslationStatus::Translated),
            ],
        );
        let fills: Vec<[u8; 3]> = ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Erase { color, .. } => Some(*color),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec![[0, 0, 0], [255, 255, 255]]);
        let inks: Vec<[u8; 3]> = ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { color, .. } => Some(*color),
                _ => None,
            })
            .collect();
        assert_eq!(inks, vec![[250, 250, 250], [0, 0, 128]]);
    }

    #[test]
    fn configured_fill_wins_over_text_colour() {
        let config = TranslationConfig::builder()
            .render_mode(RenderMode::Block)
            .erase_color([200, 10, 10])
            .build()
            .unwrap();
        let r = PageReassembler::new(&config, Arc::new(TextMeasurer::table()));
        let mut light = unit(0, 0, Rect::new(50.0, 100.0, 300.0, 115.0), "white");
        light.color = [255, 255, 255];
        let mut page = page_with(vec![light]);
        let ops = r.render(&mut page, &[result(0, "x", TranslationStatus::Translated)]);
        assert!(matches!(ops[0], DrawOp::Erase { color: [200, 10, 10], .. }));
    }

    #[test]
    fn luminance_threshold() {
        assert_eq!(erase_fill_for([255, 255, 255]), [0, 0, 0]);
        assert_eq!(erase_fill_for([0, 0, 0]), [255, 255, 255]);
        // pure yellow sits at 0.93
        assert_eq!(erase_fill_for([255, 255, 0]), [0, 0, 0]);
        assert_eq!(erase_fill_for([128, 128, 128]), [255, 255, 255]);
    }

    #[test]
    fn region_too_short_for_a_line_is_not_erased() {
        let r = reassembler(RenderMode::Hybrid);
        // 1pt tall: even grown by the tolerance it cannot hold a 6pt line
        let mut page = page_with(vec![unit(0, 0, Rect::new(50.0, 100.0, 300.0, 101.0), "tiny")]);
        let ops = r.render(&mut page, &[result(0, "छोटा", TranslationStatus::Translated)]);
        assert!(ops.is_empty(), "{ops:?}");
        assert!(page.rendered[0].lines.is_empty());
        assert!(page.rendered[0].overflow);
    }

    #[test]
    fn overlay_entries_render_verbatim() {
        let r = reassembler(RenderMode::Overlay);
        let mut page = PageModel::blank(0, 600.0, 800.0);
        let entries = vec![OverlayEntry {
            bbox: Rect::new(10.0, 10.0, 200.0, 30.0),
            text: "नमस्ते".into(),
            font_size: 12.0,
        }];
        let ops = r.render_overlay(&mut page, &entries);
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], DrawOp::Text { script: Script::Devanagari, .. }));
        assert_eq!(page.rendered[0].text, "नमस्ते");
    }
}
