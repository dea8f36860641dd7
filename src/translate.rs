//! Orchestration: drive every page through layout, translation and
//! reassembly.
//!
//! ```text
//!              ┌ spawn_blocking ┐   ┌── async ──┐   ┌ spawn_blocking ┐
//! PageInput ──▶  layout + units  ──▶  provider   ──▶   reassemble     ──▶ PageOutput
//!              └────────────────┘   └───────────┘   └────────────────┘
//! ```
//!
//! Pages run through `buffer_unordered(max_workers)` and are re-sorted by
//! index afterwards. The provider call is the only await point that waits
//! on I/O; the CPU stages run on the blocking pool so a large page does not
//! stall the runtime.

use crate::config::TranslationConfig;
use crate::context::PipelineContext;
use crate::error::{PageError, TranslateError};
use crate::output::{DebugImage, PageOutput, RunStats, TranslatedDocument};
use crate::page::{LayoutSource, PageInput, PageModel, PageSource};
use crate::pipeline::input::check_magic;
use crate::pipeline::overlay::OverlayEntry;
use crate::pipeline::pdf;
use crate::pipeline::reassemble::DrawOp;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Translate a PDF held in memory.
///
/// Returns `Err` only for fatal problems (unparseable document, wrong
/// password, no selected page, pdfium unavailable). Page-level problems are
/// reported in [`PageOutput::error`] and those pages are left untouched.
pub async fn translate_document(
    bytes: &[u8],
    config: &TranslationConfig,
    ctx: &PipelineContext,
) -> Result<TranslatedDocument, TranslateError> {
    let start = Instant::now();
    check_magic("<bytes>", bytes)?;
    let bytes = Arc::new(bytes.to_vec());

    // ── Extract ──────────────────────────────────────────────────────────
    let loaded = {
        let bytes = Arc::clone(&bytes);
        let password = config.password.clone();
        let selection = config.pages.clone();
        let dpi = ctx.raster_dpi();
        tokio::task::spawn_blocking(move || {
            pdf::load_document(&bytes, password.as_deref(), &selection, dpi)
        })
        .await
        .map_err(|e| TranslateError::Internal(format!("extraction task: {e}")))??
    };
    let total_pages = loaded.total_pages;

    let errors = config
        .overlay_map
        .as_ref()
        .map(|m| m.out_of_range(total_pages))
        .unwrap_or_default();
    for e in &errors {
        warn!("{}", e);
    }

    // ── Translate ────────────────────────────────────────────────────────
    let (mut pages, debug_images) = run(loaded.pages, config, ctx).await;

    // ── Write ────────────────────────────────────────────────────────────
    let edits: Vec<(usize, Vec<DrawOp>)> = pages
        .iter()
        .filter(|p| p.is_ok() && !p.ops.is_empty())
        .map(|p| (p.index, p.ops.clone()))
        .collect();
    let (pdf_bytes, failures) = {
        let password = config.password.clone();
        let fonts = config.fonts.clone();
        tokio::task::spawn_blocking(move || {
            pdf::write_document(&bytes, password.as_deref(), &edits, &fonts)
        })
        .await
        .map_err(|e| TranslateError::Internal(format!("writer task: {e}")))??
    };
    for failure in failures {
        if let Some(p) = pages.iter_mut().find(|p| p.page_num() == failure.page()) {
            p.error = Some(failure);
        }
    }

    let stats = RunStats::tally(total_pages, &pages, start.elapsed().as_millis() as u64);
    info!(
        "Translation complete: {}/{} pages, {} units ({} failed), {}ms",
        stats.translated_pages,
        stats.selected_pages,
        stats.units,
        stats.failed_units,
        stats.total_duration_ms
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_run_complete(stats.selected_pages, stats.translated_pages);
    }

    Ok(TranslatedDocument {
        pdf: pdf_bytes,
        pages,
        errors,
        debug_images,
        stats,
    })
}

/// Translate already-extracted pages without touching pdfium.
///
/// Outputs are sorted by page index. This is the core of
/// [`translate_document`] and what callers with their own text layer (OCR,
/// another PDF library) use directly.
pub async fn translate_pages<S: PageSource>(
    sources: &[S],
    config: &TranslationConfig,
    ctx: &PipelineContext,
) -> Vec<PageOutput> {
    let inputs = sources.iter().map(PageInput::load).collect();
    let (pages, _) = run(inputs, config, ctx).await;
    if let Some(cb) = &config.progress_callback {
        let ok = pages.iter().filter(|p| p.is_ok()).count();
        cb.on_run_complete(pages.len(), ok);
    }
    pages
}

/// Process `inputs` concurrently; returns outputs and debug images sorted
/// by page index.
pub(crate) async fn run(
    inputs: Vec<PageInput>,
    config: &TranslationConfig,
    ctx: &PipelineContext,
) -> (Vec<PageOutput>, Vec<DebugImage>) {
    let total = inputs.len();
    if let Some(cb) = &config.progress_callback {
        cb.on_run_start(total);
    }
    info!("Translating {} page(s) with {} worker(s)", total, config.max_workers.max(1));

    let mut results: Vec<(PageOutput, Option<DebugImage>)> = stream::iter(inputs)
        .map(|input| process_page(input, total, config, ctx))
        .buffer_unordered(config.max_workers.max(1))
        .collect()
        .await;
    results.sort_by_key(|(p, _)| p.index);

    let mut pages = Vec::with_capacity(results.len());
    let mut images = Vec::new();
    for (page, image) in results {
        pages.push(page);
        images.extend(image);
    }
    (pages, images)
}

/// Run one page through every stage. Never fails: problems end up in
/// [`PageOutput::error`].
pub(crate) async fn process_page(
    input: PageInput,
    total: usize,
    config: &TranslationConfig,
    ctx: &PipelineContext,
) -> (PageOutput, Option<DebugImage>) {
    let (index, width, height) = (input.index, input.width, input.height);
    let page_num = index + 1;
    let cb = config.progress_callback.as_ref();
    let fail = |error: PageError| -> (PageOutput, Option<DebugImage>) {
        if let Some(cb) = cb {
            cb.on_page_error(page_num, total, &error.to_string());
        }
        warn!("{}", error);
        (PageOutput::untouched(index, width, height, error), None)
    };

    if ctx.is_cancelled() {
        return fail(PageError::Cancelled { page: page_num });
    }
    if let Some(cb) = cb {
        cb.on_page_start(page_num, total);
    }

    let result = match &config.overlay_map {
        Some(map) => {
            if let Err(e) = map.check_bounds(index, width, height) {
                return fail(PageError::InvalidOverlayMap {
                    page: page_num,
                    detail: e.to_string(),
                });
            }
            let entries = map.entries(index).to_vec();
            overlay_page(input, entries, ctx).await
        }
        None => match input.model {
            Err(e) => return fail(e),
            Ok(model) => translate_page(model, input.raster, ctx).await,
        },
    };

    match result {
        Ok((page, image)) => {
            debug!(
                "Page {}: {} block(s) rendered via {:?}",
                page_num,
                page.rendered.len(),
                page.layout_source
            );
            if let Some(cb) = cb {
                cb.on_page_complete(page_num, total, page.rendered.len());
            }
            (page, image)
        }
        Err(e) => fail(e),
    }
}

async fn translate_page(
    model: PageModel,
    raster: Option<DynamicImage>,
    ctx: &PipelineContext,
) -> Result<(PageOutput, Option<DebugImage>), PageError> {
    let page_num = model.index + 1;
    let join_err = |e: tokio::task::JoinError| PageError::Internal {
        page: page_num,
        detail: e.to_string(),
    };

    // ── Layout and units ─────────────────────────────────────────────────
    let detector = Arc::clone(&ctx.detector);
    let builder = Arc::clone(&ctx.units);
    let (mut page, raster) = tokio::task::spawn_blocking(move || {
        let mut page = model;
        let (blocks, source) = detector.detect_or_fallback(&page, raster.as_ref());
        page.units = builder.build(page.index, &blocks);
        page.blocks = blocks;
        page.layout_source = source;
        (page, raster)
    })
    .await
    .map_err(join_err)?;
    debug!(
        "Page {}: {} block(s), {} unit(s)",
        page_num,
        page.blocks.len(),
        page.units.len()
    );

    // ── Translate ────────────────────────────────────────────────────────
    let results = ctx
        .client
        .translate_batch(&page.units, &ctx.cancel_signal())
        .await;

    // ── Reassemble ───────────────────────────────────────────────────────
    let reassembler = Arc::clone(&ctx.reassembler);
    let debug = ctx.debug.clone();
    tokio::task::spawn_blocking(move || {
        let ops = reassembler.render(&mut page, &results);
        let image = debug.and_then(|d| debug_image(&d, &page, raster.as_ref()));
        (PageOutput::from_model(page, ops, &results), image)
    })
    .await
    .map_err(join_err)
}

async fn overlay_page(
    input: PageInput,
    entries: Vec<OverlayEntry>,
    ctx: &PipelineContext,
) -> Result<(PageOutput, Option<DebugImage>), PageError> {
    let page_num = input.index + 1;
    let reassembler = Arc::clone(&ctx.reassembler);
    let debug = ctx.debug.clone();
    tokio::task::spawn_blocking(move || {
        let mut page = PageModel::blank(input.index, input.width, input.height);
        page.layout_source = LayoutSource::OverlayMap;
        let ops = reassembler.render_overlay(&mut page, &entries);
        let image = debug.and_then(|d| debug_image(&d, &page, input.raster.as_ref()));
        (PageOutput::from_model(page, ops, &[]), image)
    })
    .await
    .map_err(|e| PageError::Internal {
        page: page_num,
        detail: e.to_string(),
    })
}

fn debug_image(
    renderer: &crate::pipeline::debug::DebugRenderer,
    page: &PageModel,
    raster: Option<&DynamicImage>,
) -> Option<DebugImage> {
    match renderer.render_png(page, raster) {
        Ok(png) => Some(DebugImage {
            page_index: page.index,
            png,
        }),
        Err(e) => {
            warn!("Page {}: debug image failed: {}", page.index + 1, e);
            None
        }
    }
}
