//! Result types returned by the `translate*` entry points.
//!
//! Everything is in memory. [`PageOutput`] and [`RunStats`] derive
//! `Serialize` so a run can be dumped as JSON for inspection, and two runs
//! over the same input can be compared byte for byte.

use crate::error::{OverlayMapError, PageError};
use crate::page::{LayoutSource, PageModel};
use crate::pipeline::client::{TranslationResult, TranslationStatus};
use crate::pipeline::reassemble::{DrawOp, RenderedBlock};
use serde::{Deserialize, Serialize};

/// Per-page flags surfaced to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFlags {
    /// At least one block overflowed at the minimum font size.
    pub overflow: bool,
    /// At least one block shows its source text because translation failed.
    pub degraded: bool,
    /// Masking was skipped for at least one unit.
    pub masking_skipped: bool,
}

/// Outcome of one unit, without the translated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub unit_id: usize,
    pub status: TranslationStatus,
    pub provider: String,
    pub confidence: Option<f32>,
}

impl From<&TranslationResult> for UnitOutcome {
    fn from(r: &TranslationResult) -> Self {
        Self {
            unit_id: r.unit_id,
            status: r.status.clone(),
            provider: r.provider.clone(),
            confidence: r.confidence,
        }
    }
}

/// The translation of one selected page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutput {
    /// 0-indexed page number.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub layout_source: LayoutSource,
    /// Placements sorted by `(rank, part)`.
    pub rendered: Vec<RenderedBlock>,
    /// Operations applied to the PDF page, erases first.
    pub ops: Vec<DrawOp>,
    pub units: Vec<UnitOutcome>,
    pub flags: PageFlags,
    /// Set when the page was left untouched.
    pub error: Option<PageError>,
}

impl PageOutput {
    /// Reduce a finished page model.
    pub(crate) fn from_model(page: PageModel, ops: Vec<DrawOp>, results: &[TranslationResult]) -> Self {
        let flags = PageFlags {
            overflow: page.rendered.iter().any(|b| b.overflow),
            degraded: page.rendered.iter().any(|b| b.degraded),
            masking_skipped: results.iter().any(|r| r.masking_skipped),
        };
        Self {
            index: page.index,
            width: page.width,
            height: page.height,
            layout_source: page.layout_source,
            rendered: page.rendered,
            ops,
            units: results.iter().map(UnitOutcome::from).collect(),
            flags,
            error: None,
        }
    }

    /// A page passed through unmodified.
    pub(crate) fn untouched(index: usize, width: f32, height: f32, error: PageError) -> Self {
        Self {
            index,
            width,
            height,
            layout_source: LayoutSource::None,
            rendered: Vec::new(),
            ops: Vec::new(),
            units: Vec::new(),
            flags: PageFlags::default(),
            error: Some(error),
        }
    }

    /// 1-indexed page number.
    pub fn page_num(&self) -> usize {
        self.index + 1
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A PNG showing the detected layout of one page.
#[derive(Debug, Clone)]
pub struct DebugImage {
    pub page_index: usize,
    pub png: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages in the input document.
    pub total_pages: usize,
    /// Pages selected for translation.
    pub selected_pages: usize,
    pub translated_pages: usize,
    pub failed_pages: usize,
    pub units: usize,
    pub translated_units: usize,
    pub skipped_units: usize,
    pub failed_units: usize,
    pub overflow_blocks: usize,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub(crate) fn tally(total_pages: usize, pages: &[PageOutput], duration_ms: u64) -> Self {
        let mut stats = RunStats {
            total_pages,
            selected_pages: pages.len(),
            total_duration_ms: duration_ms,
            ..Default::default()
        };
        for p in pages {
            if p.is_ok() {
                stats.translated_pages += 1;
            } else {
                stats.failed_pages += 1;
            }
            stats.units += p.units.len();
            for u in &p.units {
                match u.status {
                    TranslationStatus::Translated => stats.translated_units += 1,
                    TranslationStatus::Skipped => stats.skipped_units += 1,
                    TranslationStatus::Failed { .. } => stats.failed_units += 1,
                }
            }
            stats.overflow_blocks += p.rendered.iter().filter(|b| b.overflow).count();
        }
        stats
    }
}

/// Complete output of [`crate::translate_document`].
#[derive(Debug, Clone)]
pub struct TranslatedDocument {
    /// The modified PDF.
    pub pdf: Vec<u8>,
    /// One entry per selected page, sorted by index.
    pub pages: Vec<PageOutput>,
    /// Overlay-map problems that do not belong to a single selected page.
    pub errors: Vec<OverlayMapError>,
    pub debug_images: Vec<DebugImage>,
    pub stats: RunStats,
}
