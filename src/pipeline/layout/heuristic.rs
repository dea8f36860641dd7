//! Geometry-only layout detection.
//!
//! Words → lines → segments → columns → blocks → reading order. Every step
//! is a sort or a single pass, so output depends only on the word geometry.

use super::{find_columns, order_blocks, Columns};
use crate::config::{HeuristicParams, ReadingDirection};
use crate::geometry::Rect;
use crate::page::{BlockLabel, PageModel, TextBlock, Word};
use tracing::debug;

/// Deterministic column/band detector.
#[derive(Debug, Clone)]
pub struct HeuristicDetector {
    params: HeuristicParams,
    direction: ReadingDirection,
}

/// A horizontal run of words on one line, split from its neighbours by a
/// wide gap.
#[derive(Debug)]
struct Segment {
    words: Vec<Word>,
    bbox: Rect,
    font_size: f32,
}

struct OpenBlock {
    column: Option<usize>,
    band: usize,
    words: Vec<Word>,
    bbox: Rect,
    font_size: f32,
}

impl HeuristicDetector {
    pub fn new(params: HeuristicParams, direction: ReadingDirection) -> Self {
        Self { params, direction }
    }

    pub fn params(&self) -> &HeuristicParams {
        &self.params
    }

    pub fn direction(&self) -> ReadingDirection {
        self.direction
    }

    /// Detect blocks over all of a page's words.
    pub fn detect(&self, page: &PageModel) -> Vec<TextBlock> {
        self.detect_words(page.words().cloned().collect())
    }

    /// Detect blocks over an arbitrary word set. Every input word ends up in
    /// exactly one returned block.
    pub fn detect_words(&self, words: Vec<Word>) -> Vec<TextBlock> {
        if words.is_empty() {
            return Vec::new();
        }
        let lines = self.lines(words);
        let segments: Vec<(usize, Segment)> = lines
            .into_iter()
            .enumerate()
            .flat_map(|(i, line)| self.segments(line).into_iter().map(move |s| (i, s)))
            .collect();

        let boxes: Vec<Rect> = segments.iter().map(|(_, s)| s.bbox).collect();
        let columns = find_columns(
            &boxes,
            self.params.narrow_segment_ratio,
            self.params.min_gutter,
            self.params.max_columns,
        );

        let mut blocks = self.group(segments, &columns);
        order_blocks(&mut blocks, self.direction, self.params.tie_tolerance);
        debug!(
            "heuristic layout: {} columns, {} blocks",
            columns.count(),
            blocks.len()
        );
        blocks
    }

    /// Cluster words into lines by vertical overlap; words in a line are
    /// ordered by x.
    pub(super) fn lines(&self, mut words: Vec<Word>) -> Vec<Vec<Word>> {
        words.sort_by(|a, b| {
            a.bbox
                .center_y()
                .total_cmp(&b.bbox.center_y())
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
                .then(a.id.cmp(&b.id))
        });

        let mut lines: Vec<(Rect, Vec<Word>)> = Vec::new();
        for w in words {
            let joins = lines.last().is_some_and(|(bbox, _)| {
                let shorter = bbox.height().min(w.bbox.height()).max(f32::EPSILON);
                bbox.vertical_overlap(&w.bbox) >= self.params.line_overlap * shorter
            });
            match lines.last_mut() {
                Some((bbox, line)) if joins => {
                    *bbox = bbox.union(&w.bbox);
                    line.push(w);
                }
                _ => lines.push((w.bbox, vec![w])),
            }
        }

        lines
            .into_iter()
            .map(|(_, mut line)| {
                line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0).then(a.id.cmp(&b.id)));
                line
            })
            .collect()
    }

    fn segments(&self, line: Vec<Word>) -> Vec<Segment> {
        let mut out: Vec<Vec<Word>> = Vec::new();
        for w in line {
            let split = out.last().and_then(|s| s.last()).is_none_or(|prev| {
                let em = prev.font_size.max(w.font_size).max(1.0);
                w.bbox.x0 - prev.bbox.x1 > self.params.segment_gap_em * em
            });
            if split {
                out.push(vec![w]);
            } else if let Some(s) = out.last_mut() {
                s.push(w);
            }
        }
        out.into_iter()
            .filter_map(|words| {
                let bbox = Rect::union_all(words.iter().map(|w| &w.bbox))?;
                let font_size = crate::page::median(words.iter().map(|w| w.font_size));
                Some(Segment {
                    words,
                    bbox,
                    font_size,
                })
            })
            .collect()
    }

    /// Grow blocks from segments taken in line order.
    ///
    /// A full-width segment after column content (or column content after a
    /// full-width run) starts a new band and closes every open block, so no
    /// block reaches across a band boundary.
    fn group(&self, segments: Vec<(usize, Segment)>, columns: &Columns) -> Vec<TextBlock> {
        let tol = self.params.min_gutter / 2.0;
        let mut open: Vec<OpenBlock> = Vec::new();
        let mut done: Vec<OpenBlock> = Vec::new();
        let mut band = 0usize;
        let mut in_spanning_run = false;

        for (_, seg) in segments {
            let column = columns.assign(&seg.bbox, tol);
            let spanning = column.is_none() && columns.count() > 1;
            if spanning != in_spanning_run {
                band += 1;
                in_spanning_run = spanning;
                done.append(&mut open);
            }

            // Blocks the segment has moved well below can no longer grow.
            let gap_em = self.params.block_gap_em;
            let (stale, live): (Vec<_>, Vec<_>) = open.into_iter().partition(|b| {
                seg.bbox.y0 - b.bbox.y1 > gap_em * b.font_size.max(seg.font_size).max(1.0)
            });
            done.extend(stale);
            open = live;

            let best = open
                .iter()
                .enumerate()
                .filter(|(_, b)| b.column == column && b.band == band)
                .filter(|(_, b)| self.continues(b, &seg))
                .min_by(|(_, a), (_, b)| {
                    (seg.bbox.y0 - a.bbox.y1).total_cmp(&(seg.bbox.y0 - b.bbox.y1))
                })
                .map(|(i, _)| i);

            match best {
                Some(i) => {
                    let b = &mut open[i];
                    b.bbox = b.bbox.union(&seg.bbox);
                    b.words.extend(seg.words);
                }
                None => open.push(OpenBlock {
                    column,
                    band,
                    words: seg.words,
                    bbox: seg.bbox,
                    font_size: seg.font_size,
                }),
            }
        }
        done.append(&mut open);

        done.into_iter()
            .filter_map(|b| TextBlock::from_words(b.words, b.column, BlockLabel::Paragraph))
            .collect()
    }

    fn continues(&self, block: &OpenBlock, seg: &Segment) -> bool {
        let em = block.font_size.max(seg.font_size).max(1.0);
        let gap = seg.bbox.y0 - block.bbox.y1;
        // Same-line segments only join when they overlap the block's bottom line.
        if gap < -0.5 * em {
            return false;
        }
        if gap > self.params.block_gap_em * em {
            return false;
        }
        if block.bbox.horizontal_overlap(&seg.bbox) <= 0.0 {
            return false;
        }
        let (lo, hi) = if block.font_size < seg.font_size {
            (block.font_size, seg.font_size)
        } else {
            (seg.font_size, block.font_size)
        };
        lo > 0.0 && hi / lo <= self.params.font_change_ratio
    }
}
