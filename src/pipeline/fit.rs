//! Line wrapping and font-size fitting.
//!
//! Text flows through a unit's regions in order. Each region is first grown
//! by the overflow tolerance and clamped to the page; that is the space the
//! rendered block may occupy. Inside it a line `i` sits at baseline
//! `top + 0.8·size + i·size·line_spacing`, and a region holds as many lines
//! as fit with the last line's glyph box inside the bottom edge.
//!
//! Wrapping is greedy: a word goes on the current line when it fits,
//! otherwise it starts the next one. A word wider than the line is broken
//! between characters.

use crate::config::{FitParams, ReadingDirection};
use crate::geometry::Rect;
use crate::pipeline::metrics::TextMeasurer;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Baseline offset from the line top, as a fraction of font size.
const ASCENT: f32 = 0.8;

/// One placed line of rendered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedLine {
    pub text: String,
    /// Left edge of the line.
    pub x: f32,
    /// Baseline, top-left origin.
    pub baseline: f32,
    pub width: f32,
}

impl RenderedLine {
    pub fn bbox(&self, font_size: f32) -> Rect {
        let top = self.baseline - ASCENT * font_size;
        Rect::new(self.x, top, self.x + self.width, top + font_size)
    }
}

/// Result of fitting one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Fitted {
    pub font_size: f32,
    /// Lines that fit, in reading order.
    pub lines: Vec<RenderedLine>,
    /// Some text did not fit at the chosen size; `lines` holds what did.
    pub overflow: bool,
    /// Number of wrapped lines that were clipped.
    pub clipped: usize,
}

impl Fitted {
    pub fn bbox(&self) -> Option<Rect> {
        let boxes: Vec<Rect> = self.lines.iter().map(|l| l.bbox(self.font_size)).collect();
        Rect::union_all(boxes.iter())
    }
}

/// Places text at a given size, or searches for the size.
pub struct Fitter<'a> {
    params: &'a FitParams,
    measurer: &'a TextMeasurer,
    direction: ReadingDirection,
    page: Rect,
}

impl<'a> Fitter<'a> {
    pub fn new(
        params: &'a FitParams,
        measurer: &'a TextMeasurer,
        direction: ReadingDirection,
        page: Rect,
    ) -> Self {
        Self {
            params,
            measurer,
            direction,
            page,
        }
    }

    /// Font size clamped to the configured range.
    pub fn clamp_size(&self, size: f32) -> f32 {
        size.clamp(self.params.min_font_size, self.params.max_font_size)
    }

    /// Lay out `text` at exactly `size`.
    pub fn place(&self, text: &str, regions: &[Rect], size: f32) -> Fitted {
        let line_height = size * self.params.line_spacing;
        let mut lines = Vec::new();
        let mut pending: VecDeque<String> = self.wrap_all(text, regions, size).into();

        for region in regions {
            let area = self.area(region);
            let capacity = line_capacity(area.height(), size, line_height);
            let inner = (area.width() - 2.0 * self.params.margin).max(1.0);
            for i in 0..capacity {
                let Some(text) = pending.pop_front() else {
                    break;
                };
                let width = self.measurer.width(&text, size);
                let x = match self.direction {
                    ReadingDirection::Ltr => area.x0 + self.params.margin,
                    ReadingDirection::Rtl => area.x0 + self.params.margin + (inner - width).max(0.0),
                };
                lines.push(RenderedLine {
                    text,
                    x,
                    baseline: area.y0 + ASCENT * size + i as f32 * line_height,
                    width,
                });
            }
        }
        let clipped = pending.len();

        Fitted {
            font_size: size,
            lines,
            overflow: clipped > 0,
            clipped,
        }
    }

    /// Whether `text` fits entirely at `size`.
    pub fn fits(&self, text: &str, regions: &[Rect], size: f32) -> bool {
        !self.place(text, regions, size).overflow
    }

    /// Binary search between `start` (capped at max) and the minimum size
    /// for the largest size at which all text fits. Overflows and clips at
    /// the minimum when nothing fits.
    pub fn shrink_to_fit(&self, text: &str, regions: &[Rect], start: f32) -> Fitted {
        let hi = self.clamp_size(start);
        let lo = self.params.min_font_size;
        let at_hi = self.place(text, regions, hi);
        if !at_hi.overflow {
            return at_hi;
        }
        if !self.fits(text, regions, lo) {
            return self.place(text, regions, lo);
        }
        let (mut lo, mut hi) = (lo, hi);
        for _ in 0..self.params.search_iterations {
            let mid = (lo + hi) / 2.0;
            if self.fits(text, regions, mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        self.place(text, regions, lo)
    }

    /// The space a region's text may occupy.
    fn area(&self, region: &Rect) -> Rect {
        region.expand(self.params.overflow_tolerance).clamp_to(&self.page)
    }

    /// Wrap the whole text, switching to the next region's width when a
    /// region's line capacity is used up.
    fn wrap_all(&self, text: &str, regions: &[Rect], size: f32) -> Vec<String> {
        let line_height = size * self.params.line_spacing;
        let widths: Vec<(f32, usize)> = regions
            .iter()
            .map(|r| {
                let area = self.area(r);
                (
                    (area.width() - 2.0 * self.params.margin).max(1.0),
                    line_capacity(area.height(), size, line_height),
                )
            })
            .collect();
        let last_width = widths.last().map(|w| w.0).unwrap_or(1.0);
        let width_for = |line: usize| {
            let mut n = line;
            for &(w, cap) in &widths {
                if n < cap {
                    return w;
                }
                n -= cap;
            }
            last_width
        };

        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            let max = width_for(lines.len());
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if self.measurer.width(&candidate, size) <= max {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let max = width_for(lines.len());
            if self.measurer.width(word, size) <= max {
                current = word.to_string();
            } else if let Some(rest) = self.break_word(word, size, &width_for, &mut lines) {
                current = rest;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    /// Break an over-long word between characters. Full pieces are pushed
    /// onto `lines`; the trailing partial piece is returned.
    fn break_word(
        &self,
        word: &str,
        size: f32,
        width_for: &impl Fn(usize) -> f32,
        lines: &mut Vec<String>,
    ) -> Option<String> {
        let mut piece = String::new();
        for c in word.chars() {
            let mut next = piece.clone();
            next.push(c);
            if !piece.is_empty() && self.measurer.width(&next, size) > width_for(lines.len()) {
                lines.push(std::mem::take(&mut piece));
                piece.push(c);
            } else {
                piece = next;
            }
        }
        (!piece.is_empty()).then_some(piece)
    }
}

/// Lines of `size` that fit in `height` with the given line pitch.
fn line_capacity(height: f32, size: f32, line_height: f32) -> usize {
    if height + 1e-3 < size {
        return 0;
    }
    ((height - size + 1e-3) / line_height).floor() as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FitParams {
        FitParams {
            min_font_size: 6.0,
            max_font_size: 36.0,
            margin: 0.0,
            overflow_tolerance: 0.0,
            line_spacing: 1.2,
            search_iterations: 14,
        }
    }

    const PAGE: Rect = Rect {
        x0: 0.0,
        y0: 0.0,
        x1: 600.0,
        y1: 800.0,
    };

    #[test]
    fn capacity() {
        assert_eq!(line_capacity(10.0, 12.0, 14.4), 0);
        assert_eq!(line_capacity(12.0, 12.0, 14.4), 1);
        assert_eq!(line_capacity(26.4, 12.0, 14.4), 2);
    }

    #[test]
    fn greedy_wrap() {
        let p = params();
        let m = TextMeasurer::table();
        let f = Fitter::new(&p, &m, ReadingDirection::Ltr, PAGE);
        // each "aaaa" is 20pt wide at 10pt, a space 2.8pt
        let region = Rect::new(0.0, 0.0, 45.0, 100.0);
        let out = f.place("aaaa aaaa aaaa", &[region], 10.0);
        let texts: Vec<_> = out.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa aaaa", "aaaa"]);
        assert!(!out.overflow);
        assert!((out.lines[0].baseline - 8.0).abs() < 1e-4);
        assert!((out.lines[1].baseline - 20.0).abs() < 1e-4);
    }

    #[test]
    fn long_word_breaks() {
        let p = params();
        let m = TextMeasurer::table();
        let f = Fitter::new(&p, &m, ReadingDirection::Ltr, PAGE);
        let region = Rect::new(0.0, 0.0, 20.0, 100.0);
        let out = f.place("abcdefghij", &[region], 10.0);
        assert_eq!(out.lines.len(), 3);
        assert_eq!(out.lines[0].text, "abcd");
    }

    #[test]
    fn flows_across_regions() {
        let p = params();
        let m = TextMeasurer::table();
        let f = Fitter::new(&p, &m, ReadingDirection::Ltr, PAGE);
        let a = Rect::new(0.0, 0.0, 25.0, 12.0);
        let b = Rect::new(0.0, 50.0, 25.0, 62.0);
        let out = f.place("aaaa bbbb", &[a, b], 10.0);
        assert_eq!(out.lines.len(), 2);
        assert!(out.lines[1].baseline > 50.0);
        assert!(!out.overflow);
    }

    #[test]
    fn rtl_right_aligns() {
        let p = params();
        let m = TextMeasurer::table();
        let f = Fitter::new(&p, &m, ReadingDirection::Rtl, PAGE);
        let region = Rect::new(0.0, 0.0, 100.0, 20.0);
        let out = f.place("aa", &[region], 10.0);
        assert!((out.lines[0].x - 90.0).abs() < 1e-4);
    }

    #[test]
    fn shrinks_until_it_fits() {
        let p = params();
        let m = TextMeasurer::table();
        let f = Fitter::new(&p, &m, ReadingDirection::Ltr, PAGE);
        let region = Rect::new(0.0, 0.0, 100.0, 14.0);
        let text = "word ".repeat(12);
        let out = f.shrink_to_fit(&text, &[region], 12.0);
        assert!(!out.overflow);
        assert!(out.font_size < 12.0 && out.font_size >= 6.0);
        let bbox = out.bbox().unwrap();
        assert!(region.contains_rect(&bbox, 1e-3));
    }

    #[test]
    fn overflows_at_min_and_clips() {
        let p = params();
        let m = TextMeasurer::table();
        let f = Fitter::new(&p, &m, ReadingDirection::Ltr, PAGE);
        let region = Rect::new(0.0, 0.0, 40.0, 8.0);
        let text = "word ".repeat(40);
        let out = f.shrink_to_fit(&text, &[region], 12.0);
        assert!(out.overflow);
        assert_eq!(out.font_size, 6.0);
        assert!(!out.lines.is_empty());
        assert!(out.clipped > 0);
        assert!(region.contains_rect(&out.bbox().unwrap(), 1e-3));
    }
}
