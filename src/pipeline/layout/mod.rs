//! Layout detection: words → ordered [`TextBlock`]s.
//!
//! Two detectors form a closed set behind [`LayoutDetector`]:
//!
//! * [`heuristic::HeuristicDetector`]: pure geometry, deterministic.
//! * [`learned::LearnedLayoutDetector`]: maps regions from an external
//!   layout model onto the page's words.
//!
//! Both share the column finder and the reading-order routine in this
//! module, so a page gets the same ordering rules whichever detector
//! grouped its words.
//!
//! ## Reading order
//!
//! ```text
//!  ┌──────────── band 1 (full width) ────────────┐  rank 0
//!  │ col 0 ─┐        │ col 1 ─┐                   │
//!  │  blk   │ 1      │  blk   │ 3                 │
//!  │  blk   ▼ 2      │  blk   ▼ 4                 │
//!  └──────────── band 2 (full width) ────────────┘  rank 5
//! ```
//!
//! Full-width blocks split the page into horizontal bands; inside a band
//! columns are read one after another (left to right for LTR), each top to
//! bottom. Blocks whose tops are within `tie_tolerance` of each other count
//! as one row and are ordered by x.

pub mod assets;
pub mod heuristic;
pub mod learned;

use crate::config::ReadingDirection;
use crate::error::LayoutModelError;
use crate::geometry::Rect;
use crate::page::{LayoutSource, PageModel, TextBlock};
use image::DynamicImage;
use std::cmp::Ordering;
use tracing::warn;

pub use heuristic::HeuristicDetector;
pub use learned::{CommandLayoutModel, LayoutModel, LayoutRegion, LearnedLayoutDetector};

/// The configured layout detector for a run.
pub enum LayoutDetector {
    Heuristic(HeuristicDetector),
    Learned(LearnedLayoutDetector),
}

impl LayoutDetector {
    /// Group and order the page's words.
    ///
    /// `raster` is the rendered page; only the learned detector reads it.
    pub fn detect(
        &self,
        page: &PageModel,
        raster: Option<&DynamicImage>,
    ) -> Result<Vec<TextBlock>, LayoutModelError> {
        match self {
            LayoutDetector::Heuristic(h) => Ok(h.detect(page)),
            LayoutDetector::Learned(l) => l.detect(page, raster),
        }
    }

    /// Like [`detect`](Self::detect), but never fails: a learned-model error
    /// falls back to the heuristic detector for this page only.
    pub fn detect_or_fallback(
        &self,
        page: &PageModel,
        raster: Option<&DynamicImage>,
    ) -> (Vec<TextBlock>, LayoutSource) {
        match self {
            LayoutDetector::Heuristic(h) => (h.detect(page), LayoutSource::Heuristic),
            LayoutDetector::Learned(l) => match l.detect(page, raster) {
                Ok(blocks) => (blocks, LayoutSource::Learned),
                Err(e) => {
                    warn!("Page {}: {}; using heuristic layout", page.index + 1, e);
                    (l.fallback().detect(page), LayoutSource::HeuristicFallback)
                }
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LayoutDetector::Heuristic(_) => "heuristic",
            LayoutDetector::Learned(_) => "learned",
        }
    }
}

// ── Columns ──────────────────────────────────────────────────────────────

/// Detected column layout: `boundaries[i]` is the gutter x between column
/// `i` and `i + 1`. An empty list means a single column.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Columns {
    pub boundaries: Vec<f32>,
}

impl Columns {
    pub fn count(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Column of a box, or `None` when it crosses a gutter by more than `tol`.
    pub fn assign(&self, bbox: &Rect, tol: f32) -> Option<usize> {
        if self
            .boundaries
            .iter()
            .any(|&b| bbox.x0 < b - tol && bbox.x1 > b + tol)
        {
            return None;
        }
        let (cx, _) = bbox.center();
        Some(self.boundaries.iter().filter(|&&b| cx > b).count())
    }
}

/// Gap-based column clustering.
///
/// Only "narrow" boxes (narrower than `narrow_ratio` of the overall text
/// width) vote: full-width titles would otherwise bridge every gutter. Their
/// x-intervals are merged when they overlap or are separated by less than
/// `min_gutter`; clusters backed by a single box are folded into their
/// nearest neighbour, and the narrowest gutters are closed until at most
/// `max_columns` remain.
pub(crate) fn find_columns(
    boxes: &[Rect],
    narrow_ratio: f32,
    min_gutter: f32,
    max_columns: usize,
) -> Columns {
    let Some(span) = Rect::union_all(boxes.iter()) else {
        return Columns::default();
    };
    let text_width = span.width();
    if text_width <= 0.0 {
        return Columns::default();
    }

    let mut intervals: Vec<(f32, f32)> = boxes
        .iter()
        .filter(|b| b.width() < narrow_ratio * text_width)
        .map(|b| (b.x0, b.x1))
        .collect();
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    // (x0, x1, support)
    let mut clusters: Vec<(f32, f32, usize)> = Vec::new();
    for (x0, x1) in intervals {
        match clusters.last_mut() {
            Some(c) if x0 < c.1 + min_gutter => {
                c.1 = c.1.max(x1);
                c.2 += 1;
            }
            _ => clusters.push((x0, x1, 1)),
        }
    }

    while clusters.len() > 1 {
        let Some(weak) = clusters.iter().position(|c| c.2 < 2) else {
            break;
        };
        let target = nearest_neighbour(&clusters, weak);
        merge_clusters(&mut clusters, weak.min(target));
    }

    while clusters.len() > max_columns.max(1) {
        let narrowest = (0..clusters.len() - 1)
            .min_by(|&a, &b| {
                let ga = clusters[a + 1].0 - clusters[a].1;
                let gb = clusters[b + 1].0 - clusters[b].1;
                ga.total_cmp(&gb)
            })
            .unwrap_or(0);
        merge_clusters(&mut clusters, narrowest);
    }

    Columns {
        boundaries: clusters
            .windows(2)
            .map(|w| (w[0].1 + w[1].0) / 2.0)
            .collect(),
    }
}

fn nearest_neighbour(clusters: &[(f32, f32, usize)], i: usize) -> usize {
    let left = i.checked_sub(1).map(|l| clusters[i].0 - clusters[l].1);
    let right = clusters.get(i + 1).map(|r| r.0 - clusters[i].1);
    match (left, right) {
        (Some(l), Some(r)) if l <= r => i - 1,
        (Some(_), Some(_)) => i + 1,
        (Some(_), None) => i - 1,
        _ => i + 1,
    }
}

/// Merge cluster `i` with cluster `i + 1`.
fn merge_clusters(clusters: &mut Vec<(f32, f32, usize)>, i: usize) {
    let next = clusters.remove(i + 1);
    let c = &mut clusters[i];
    c.0 = c.0.min(next.0);
    c.1 = c.1.max(next.1);
    c.2 += next.2;
}

// ── Reading order ────────────────────────────────────────────────────────

/// Sort `blocks` into reading order and assign `rank` and `id` as `0..n`.
pub(crate) fn order_blocks(
    blocks: &mut Vec<TextBlock>,
    direction: ReadingDirection,
    tie_tolerance: f32,
) {
    let order = reading_order(blocks, direction, tie_tolerance);
    apply_order(blocks, order);
}

/// Indices of `blocks` in reading order.
pub(crate) fn reading_order(
    blocks: &[TextBlock],
    direction: ReadingDirection,
    tie_tolerance: f32,
) -> Vec<usize> {
    let mut spanning: Vec<usize> = (0..blocks.len())
        .filter(|&i| blocks[i].column.is_none())
        .collect();
    sort_rows(&mut spanning, blocks, direction, tie_tolerance);

    // sequence slot: column content between spanning bands gets even slots,
    // spanning blocks odd ones.
    let mut slot = vec![0usize; blocks.len()];
    for (k, &i) in spanning.iter().enumerate() {
        slot[i] = 2 * k + 1;
    }
    for (i, b) in blocks.iter().enumerate() {
        if b.column.is_some() {
            let above = spanning
                .iter()
                .filter(|&&s| blocks[s].bbox.center_y() < b.bbox.center_y())
                .count();
            slot[i] = 2 * above;
        }
    }

    let mut order: Vec<usize> = (0..blocks.len()).collect();
    // Sort by (slot, column in direction order) first, then rows inside.
    order.sort_by(|&a, &b| {
        slot[a]
            .cmp(&slot[b])
            .then_with(|| column_key(&blocks[a], direction).cmp(&column_key(&blocks[b], direction)))
    });
    let mut grouped: Vec<usize> = Vec::with_capacity(order.len());
    let mut start = 0;
    while start < order.len() {
        let key = (slot[order[start]], blocks[order[start]].column);
        let mut end = start;
        while end < order.len() && (slot[order[end]], blocks[order[end]].column) == key {
            end += 1;
        }
        let mut group = order[start..end].to_vec();
        sort_rows(&mut group, blocks, direction, tie_tolerance);
        grouped.extend(group);
        start = end;
    }
    grouped
}

/// Rearrange `blocks` to follow `order` (a permutation of their indices) and
/// assign `rank` and `id` as `0..n`.
pub(crate) fn apply_order(blocks: &mut Vec<TextBlock>, order: Vec<usize>) {
    let mut taken: Vec<Option<TextBlock>> = blocks.drain(..).map(Some).collect();
    for (rank, i) in order.into_iter().enumerate() {
        if let Some(mut b) = taken[i].take() {
            b.rank = rank;
            b.id = rank;
            blocks.push(b);
        }
    }
}

fn column_key(b: &TextBlock, direction: ReadingDirection) -> i64 {
    let c = b.column.map(|c| c as i64).unwrap_or(-1);
    match direction {
        ReadingDirection::Ltr => c,
        ReadingDirection::Rtl => -c,
    }
}

/// Order indices top to bottom; tops within `tol` of the row's first top
/// form one row, ordered by x in reading direction.
fn sort_rows(idx: &mut Vec<usize>, blocks: &[TextBlock], direction: ReadingDirection, tol: f32) {
    idx.sort_by(|&a, &b| {
        blocks[a]
            .bbox
            .y0
            .total_cmp(&blocks[b].bbox.y0)
            .then(blocks[a].bbox.x0.total_cmp(&blocks[b].bbox.x0))
    });
    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut row_top = f32::NEG_INFINITY;
    for &i in idx.iter() {
        let top = blocks[i].bbox.y0;
        if rows.is_empty() || top - row_top > tol {
            rows.push(vec![i]);
            row_top = top;
        } else if let Some(r) = rows.last_mut() {
            r.push(i);
        }
    }
    idx.clear();
    for mut row in rows {
        row.sort_by(|&a, &b| x_order(&blocks[a].bbox, &blocks[b].bbox, direction));
        idx.extend(row);
    }
}

fn x_order(a: &Rect, b: &Rect, direction: ReadingDirection) -> Ordering {
    match direction {
        ReadingDirection::Ltr => a.x0.total_cmp(&b.x0),
        ReadingDirection::Rtl => b.x1.total_cmp(&a.x1),
    }
}
