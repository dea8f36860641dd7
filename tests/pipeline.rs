//! Offline integration tests for the translation pipeline.
//!
//! Every test drives the public API with in-memory pages and the dictionary
//! provider, so nothing here needs pdfium or network access.
//!
//! Run with:
//!   cargo test --test pipeline

use pdf_translate::geometry::{Polygon, Rect};
use pdf_translate::page::{LayoutSource, TextBlock};
use pdf_translate::pipeline::layout::{
    HeuristicDetector, LayoutDetector, LayoutModel, LayoutRegion, LearnedLayoutDetector,
};
use pdf_translate::pipeline::provider::{DictionaryProvider, TranslationProvider};
use pdf_translate::pipeline::units::UnitBuilder;
use pdf_translate::error::LayoutModelError;
use pdf_translate::pipeline::units::TranslationUnit;
use pdf_translate::{
    translate_pages, translate_stream, Credentials, DrawOp, LayoutMode, MemoryPage, PageModel,
    PageOutput, PipelineContext, ProviderKind, RenderMode, TranslationConfig,
};
use futures::StreamExt;
use image::DynamicImage;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn dictionary(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(s, t)| (s.to_string(), t.to_string()))
        .collect()
}

fn config_with(entries: &[(&str, &str)]) -> TranslationConfig {
    TranslationConfig::builder()
        .provider(ProviderKind::Dictionary)
        .dictionary(dictionary(entries))
        .build()
        .unwrap()
}

async fn context(config: &TranslationConfig) -> PipelineContext {
    PipelineContext::initialize(config, &Credentials::default())
        .await
        .unwrap()
}

fn heuristic(config: &TranslationConfig) -> HeuristicDetector {
    HeuristicDetector::new(config.heuristic.clone(), config.direction)
}

/// Header band, two columns of four lines, footer band.
fn report_page(index: usize) -> MemoryPage {
    let mut page = MemoryPage::new(index, 600.0, 800.0);
    page.push_line("जिला शिक्षा कार्यालय की वार्षिक रिपोर्ट", 50.0, 40.0, 12.0);
    for i in 0..4 {
        let y = 100.0 + i as f32 * 14.0;
        page.push_line("नमस्ते दुनिया", 50.0, y, 12.0);
        page.push_line("धन्यवाद मित्र", 320.0, y, 12.0);
    }
    page.push_line("पृष्ठ एक", 50.0, 760.0, 12.0);
    page
}

fn report_entries() -> Vec<(&'static str, &'static str)> {
    vec![
        ("नमस्ते", "hello"),
        ("दुनिया", "world"),
        ("धन्यवाद", "thanks"),
        ("मित्र", "friend"),
        ("पृष्ठ", "page"),
        ("एक", "one"),
        ("रिपोर्ट", "report"),
    ]
}

/// `report_page` with a blank raster at 72 dpi attached.
fn rastered_report_page(index: usize) -> MemoryPage {
    report_page(index).with_raster(DynamicImage::new_rgb8(600, 800))
}

fn to_json(pages: &[PageOutput]) -> String {
    serde_json::to_string(pages).unwrap()
}

// ── Reading order and placement ──────────────────────────────────────────────

#[tokio::test]
async fn two_columns_left_first_and_inside_own_box() {
    let config = config_with(&report_entries());
    let ctx = context(&config).await;

    let mut page = MemoryPage::new(0, 600.0, 800.0);
    for i in 0..3 {
        let y = 100.0 + i as f32 * 14.0;
        page.push_line("नमस्ते दुनिया", 50.0, y, 12.0);
        page.push_line("धन्यवाद मित्र", 320.0, y, 12.0);
    }
    let blocks = heuristic(&config).detect(&PageModel::load(&page).unwrap());
    assert_eq!(blocks.len(), 2, "{blocks:#?}");
    let left = blocks.iter().find(|b| b.column == Some(0)).unwrap();
    let right = blocks.iter().find(|b| b.column == Some(1)).unwrap();
    assert_eq!(left.rank, 0);
    assert_eq!(right.rank, 1);

    let out = translate_pages(&[page], &config, &ctx).await;
    let p = &out[0];
    assert!(p.is_ok(), "{:?}", p.error);
    assert_eq!(p.rendered.len(), 2);

    let first = &p.rendered[0];
    assert_eq!(first.block_ids, vec![left.id]);
    assert!(first.text.starts_with("hello world"), "{}", first.text);
    let allowed = left.bbox.expand(config.fit.overflow_tolerance);
    assert!(
        allowed.contains_rect(&first.bbox, 0.01),
        "{:?} escapes {:?}",
        first.bbox,
        allowed
    );
    assert!(first.bbox.x1 < right.bbox.x0);

    let second = &p.rendered[1];
    assert_eq!(second.block_ids, vec![right.id]);
    assert!(second.text.starts_with("thanks friend"));
}

#[tokio::test]
async fn erases_come_before_text() {
    let config = config_with(&report_entries());
    let ctx = context(&config).await;
    let out = translate_pages(&[report_page(0)], &config, &ctx).await;
    let ops = &out[0].ops;
    let first_text = ops
        .iter()
        .position(|op| matches!(op, DrawOp::Text { .. }))
        .unwrap();
    assert!(ops[first_text..]
        .iter()
        .all(|op| matches!(op, DrawOp::Text { .. })));
    assert!(first_text > 0);
}

// ── Masking ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn phone_number_survives_translation() {
    let config = config_with(&[("call", "कॉल करें"), ("now", "अभी")]);
    let ctx = context(&config).await;

    let mut page = MemoryPage::new(0, 600.0, 800.0);
    page.push_line("Call 555-1234 now", 72.0, 72.0, 12.0);
    let out = translate_pages(&[page], &config, &ctx).await;

    let p = &out[0];
    assert!(p.is_ok());
    assert_eq!(p.rendered.len(), 1);
    let text = &p.rendered[0].text;
    assert!(text.contains("555-1234"), "{text}");
    assert!(text.contains("कॉल करें"));
    assert!(!text.contains('⟦'));
    assert!(!p.flags.masking_skipped);
}

#[tokio::test]
async fn protected_only_unit_is_skipped() {
    let config = config_with(&[("call", "कॉल करें")]);
    let ctx = context(&config).await;

    let mut page = MemoryPage::new(0, 600.0, 800.0);
    page.push_line("2024-25", 72.0, 72.0, 12.0);
    let out = translate_pages(&[page], &config, &ctx).await;

    let p = &out[0];
    assert!(p.is_ok());
    assert!(p.rendered.is_empty());
    assert!(p.ops.is_empty());
}

// ── Fitting ──────────────────────────────────────────────────────────────────

const LONG: &str = "good morning to the whole wide world";

fn short_line_page() -> MemoryPage {
    let mut page = MemoryPage::new(0, 600.0, 800.0);
    page.push_line("नमस्ते दुनिया", 72.0, 72.0, 12.0);
    page
}

#[tokio::test]
async fn longer_translation_shrinks_in_hybrid_mode() {
    let config = TranslationConfig::builder()
        .provider(ProviderKind::Dictionary)
        .dictionary_entry("नमस्ते दुनिया", LONG)
        .render_mode(RenderMode::Hybrid)
        .build()
        .unwrap();
    let ctx = context(&config).await;
    let out = translate_pages(&[short_line_page()], &config, &ctx).await;

    let b = &out[0].rendered[0];
    assert_eq!(b.text, LONG);
    assert!(!b.overflow);
    assert!(b.font_size < 12.0, "font size {}", b.font_size);
    assert!(b.font_size >= config.fit.min_font_size);
    assert!(b.lines.len() > 1);
    let joined: Vec<&str> = b.lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(joined.join(" "), LONG);
    assert!(!out[0].flags.overflow);
}

#[tokio::test]
async fn longer_translation_clips_in_block_mode() {
    let config = TranslationConfig::builder()
        .provider(ProviderKind::Dictionary)
        .dictionary_entry("नमस्ते दुनिया", LONG)
        .render_mode(RenderMode::Block)
        .build()
        .unwrap();
    let ctx = context(&config).await;
    let page = short_line_page();
    let source = PageModel::load(&page).unwrap();
    let region = heuristic(&config).detect(&source)[0].bbox;
    let out = translate_pages(&[page], &config, &ctx).await;

    let p = &out[0];
    let b = &p.rendered[0];
    assert!(b.overflow);
    assert!(p.flags.overflow);
    assert_eq!(b.font_size, 12.0);
    assert_eq!(b.lines.len(), 1);
    assert_eq!(b.lines[0].text, "good morning");

    let allowed = region.expand(config.fit.overflow_tolerance);
    for line in &b.lines {
        assert!(allowed.contains_rect(&line.bbox(b.font_size), 0.01));
    }
    let drawn: Vec<&DrawOp> = p
        .ops
        .iter()
        .filter(|op| matches!(op, DrawOp::Text { .. }))
        .collect();
    assert_eq!(drawn.len(), 1);
}

// ── Colour ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn light_text_keeps_its_colour_over_a_dark_fill() {
    let config = config_with(&report_entries());
    let ctx = context(&config).await;
    let mut page = MemoryPage::new(0, 600.0, 800.0);
    page.set_pen([255, 255, 240]).push_line("नमस्ते दुनिया।", 72.0, 72.0, 12.0);
    page.set_pen([20, 20, 20]).push_line("धन्यवाद मित्र", 72.0, 400.0, 12.0);

    let out = translate_pages(&[page], &config, &ctx).await;
    let ops = &out[0].ops;
    let fills: Vec<[u8; 3]> = ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Erase { color, .. } => Some(*color),
            _ => None,
        })
        .collect();
    assert_eq!(fills, vec![[0, 0, 0], [255, 255, 255]]);
    let inks: Vec<(&str, [u8; 3])> = ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Text { text, color, .. } => Some((text.as_str(), *color)),
            _ => None,
        })
        .collect();
    assert_eq!(
        inks,
        vec![("hello world।", [255, 255, 240]), ("thanks friend", [20, 20, 20])]
    );
}

#[tokio::test]
async fn overlay_mode_keeps_source_text() {
    let config = TranslationConfig::builder()
        .provider(ProviderKind::Dictionary)
        .dictionary(dictionary(&report_entries()))
        .render_mode(RenderMode::Overlay)
        .build()
        .unwrap();
    let ctx = context(&config).await;
    let out = translate_pages(&[report_page(0)], &config, &ctx).await;
    assert!(out[0].is_ok());
    assert!(!out[0].rendered.is_empty());
    assert!(out[0]
        .ops
        .iter()
        .all(|op| !matches!(op, DrawOp::Erase { .. })));
}

// ── Learned layout ───────────────────────────────────────────────────────────

/// Returns one fixed region covering the left column.
struct LeftColumnModel;

impl LayoutModel for LeftColumnModel {
    fn name(&self) -> &str {
        "left-column"
    }

    fn infer(&self, _raster: &DynamicImage) -> Result<Vec<LayoutRegion>, LayoutModelError> {
        Ok(vec![LayoutRegion {
            polygon: Polygon::from_rect(&Rect::new(40.0, 90.0, 300.0, 170.0)),
            label: "text".into(),
            order: Some(0),
            confidence: Some(0.9),
        }])
    }
}

struct BrokenModel;

impl LayoutModel for BrokenModel {
    fn name(&self) -> &str {
        "broken"
    }

    fn infer(&self, _raster: &DynamicImage) -> Result<Vec<LayoutRegion>, LayoutModelError> {
        Err(LayoutModelError::InvalidOutput("not json".into()))
    }
}

fn learned_context(config: &TranslationConfig, model: Option<Arc<dyn LayoutModel>>) -> PipelineContext {
    let fallback = heuristic(config);
    let learned = match model {
        Some(m) => LearnedLayoutDetector::with_model(m, fallback, 72),
        None => LearnedLayoutDetector::unavailable("no model", fallback),
    };
    let provider = TranslationProvider::Dictionary(DictionaryProvider::new(&config.dictionary));
    PipelineContext::with_parts(config, provider, LayoutDetector::Learned(learned)).unwrap()
}

#[tokio::test]
async fn unconfigured_learned_layout_falls_back_to_heuristic() {
    let config = TranslationConfig::builder()
        .provider(ProviderKind::Dictionary)
        .dictionary(dictionary(&report_entries()))
        .layout(LayoutMode::Learned)
        .build()
        .unwrap();
    let ctx = context(&config).await;

    let learned = translate_pages(&[report_page(0)], &config, &ctx).await;
    assert!(learned[0].is_ok());
    assert_eq!(learned[0].layout_source, LayoutSource::HeuristicFallback);

    let plain = config_with(&report_entries());
    let plain_ctx = context(&plain).await;
    let heuristic_out = translate_pages(&[report_page(0)], &plain, &plain_ctx).await;
    assert_eq!(learned[0].rendered, heuristic_out[0].rendered);
    assert_eq!(learned[0].ops, heuristic_out[0].ops);
}

#[tokio::test]
async fn failing_model_falls_back_per_page() {
    let config = config_with(&report_entries());
    let ctx = learned_context(&config, Some(Arc::new(BrokenModel)));
    let out = translate_pages(&[report_page(0), report_page(1)], &config, &ctx).await;
    for p in &out {
        assert!(p.is_ok());
        assert_eq!(p.layout_source, LayoutSource::HeuristicFallback);
        assert!(!p.rendered.is_empty());
    }
}

#[tokio::test]
async fn learned_regions_used_when_model_answers() {
    let config = config_with(&report_entries());
    let ctx = learned_context(&config, Some(Arc::new(LeftColumnModel)));
    let out = translate_pages(&[rastered_report_page(0)], &config, &ctx).await;
    assert!(out[0].is_ok());
    assert_eq!(out[0].layout_source, LayoutSource::Learned);
    assert!(out[0]
        .rendered
        .iter()
        .any(|b| b.text.contains("hello world")));
}

#[tokio::test]
async fn page_without_raster_is_not_sent_to_the_model() {
    let config = config_with(&report_entries());
    let ctx = learned_context(&config, Some(Arc::new(LeftColumnModel)));
    let out = translate_pages(&[report_page(0)], &config, &ctx).await;
    assert!(out[0].is_ok());
    assert_eq!(out[0].layout_source, LayoutSource::HeuristicFallback);
}

#[test]
fn header_outside_model_regions_is_read_first() {
    let config = config_with(&report_entries());
    let page = PageModel::load(&report_page(0)).unwrap();
    let raster = DynamicImage::new_rgb8(600, 800);
    let learned = LayoutDetector::Learned(LearnedLayoutDetector::with_model(
        Arc::new(LeftColumnModel),
        heuristic(&config),
        72,
    ));
    let (blocks, source) = learned.detect_or_fallback(&page, Some(&raster));
    assert_eq!(source, LayoutSource::Learned);

    let by_rank = |r: usize| blocks.iter().find(|b| b.rank == r).unwrap();
    assert!(by_rank(0).text().starts_with("जिला"), "{:?}", by_rank(0).text());
    assert!(by_rank(1).text().starts_with("नमस्ते"), "{:?}", by_rank(1).text());
}

// ── Block invariants ─────────────────────────────────────────────────────────

fn assert_partition(page: &PageModel, blocks: &[TextBlock]) {
    let expected: BTreeSet<usize> = page.words().map(|w| w.id).collect();
    let seen: Vec<usize> = blocks
        .iter()
        .flat_map(|b| b.words.iter().map(|w| w.id))
        .collect();
    assert_eq!(seen.len(), page.word_count(), "a word appears twice");
    assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), expected);

    let mut ranks: Vec<usize> = blocks.iter().map(|b| b.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, (0..blocks.len()).collect::<Vec<_>>());
}

#[test]
fn every_detector_conserves_words_and_ranks() {
    let config = config_with(&report_entries());
    let page = PageModel::load(&report_page(0)).unwrap();

    let h = LayoutDetector::Heuristic(heuristic(&config));
    let (blocks, source) = h.detect_or_fallback(&page, None);
    assert_eq!(source, LayoutSource::Heuristic);
    assert_partition(&page, &blocks);

    let learned = LayoutDetector::Learned(LearnedLayoutDetector::with_model(
        Arc::new(LeftColumnModel),
        heuristic(&config),
        72,
    ));
    let raster = DynamicImage::new_rgb8(600, 800);
    let (blocks, source) = learned.detect_or_fallback(&page, Some(&raster));
    assert_eq!(source, LayoutSource::Learned);
    assert_partition(&page, &blocks);

    let broken = LayoutDetector::Learned(LearnedLayoutDetector::unavailable("gone", heuristic(&config)));
    let (blocks, source) = broken.detect_or_fallback(&page, None);
    assert_eq!(source, LayoutSource::HeuristicFallback);
    assert_partition(&page, &blocks);
}

// ── Unit boundaries ──────────────────────────────────────────────────────────

fn units_for(config: &TranslationConfig, page: &MemoryPage) -> Vec<TranslationUnit> {
    let model = PageModel::load(page).unwrap();
    let blocks = heuristic(config).detect(&model);
    UnitBuilder::new(config).unwrap().build(0, &blocks)
}

#[test]
fn unfinished_sentence_merges_with_next_block() {
    let config = TranslationConfig::default();
    let mut page = MemoryPage::new(0, 600.0, 800.0);
    page.push_line("The committee met on Monday and", 50.0, 100.0, 12.0);
    page.push_line("agreed on the new budget.", 50.0, 140.0, 12.0);

    let units = units_for(&config, &page);
    assert_eq!(units.len(), 1, "{units:#?}");
    assert_eq!(units[0].block_ids.len(), 2);
    assert_eq!(units[0].regions.len(), 2);
    assert_eq!(
        units[0].text,
        "The committee met on Monday and agreed on the new budget."
    );
}

#[test]
fn protected_spans_at_a_merge_boundary_stay_whole() {
    let config = TranslationConfig::default();
    let mut page = MemoryPage::new(0, 600.0, 800.0);
    page.push_line("Invoice total 1,250", 50.0, 100.0, 12.0);
    page.push_line("2024-03-31 is the due date.", 50.0, 140.0, 12.0);

    let units = units_for(&config, &page);
    assert_eq!(units.len(), 1, "{units:#?}");
    let unit = &units[0];
    assert_eq!(unit.text, "Invoice total 1,250 2024-03-31 is the due date.");
    let spans: Vec<&str> = unit
        .protected
        .iter()
        .map(|s| &unit.text[s.start..s.end])
        .collect();
    assert_eq!(spans, vec!["1,250", "2024-03-31"]);
}

#[test]
fn sentence_end_keeps_blocks_apart() {
    let config = TranslationConfig::default();
    let mut page = MemoryPage::new(0, 600.0, 800.0);
    page.push_line("बैठक सोमवार को हुई।", 50.0, 100.0, 12.0);
    page.push_line("बजट पारित हुआ।", 50.0, 140.0, 12.0);

    let units = units_for(&config, &page);
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|u| u.block_ids.len() == 1));
}

#[test]
fn long_block_splits_on_sentence_boundaries() {
    let config = TranslationConfig::builder()
        .max_unit_chars(40)
        .build()
        .unwrap();
    let mut page = MemoryPage::new(0, 600.0, 800.0);
    for i in 0..4 {
        page.push_line("यह एक वाक्य है।", 50.0, 100.0 + i as f32 * 14.0, 12.0);
    }

    let units = units_for(&config, &page);
    assert_eq!(units.len(), 2, "{units:#?}");
    assert_eq!(units[0].block_ids, units[1].block_ids);
    assert_eq!(units[0].part, 0);
    assert_eq!(units[1].part, 1);
    assert_eq!(units[0].text, "यह एक वाक्य है। यह एक वाक्य है।");
    assert_eq!(units[1].text, units[0].text);
    assert!(units[0].regions[0].y1 <= units[1].regions[0].y0);
}

// ── Determinism ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_runs_are_identical() {
    let config = config_with(&report_entries());
    let ctx = context(&config).await;
    let pages: Vec<MemoryPage> = (0..3).map(report_page).collect();

    let first = translate_pages(&pages, &config, &ctx).await;
    let second = translate_pages(&pages, &config, &ctx).await;
    assert_eq!(to_json(&first), to_json(&second));
}

#[tokio::test]
async fn worker_count_does_not_change_output() {
    let pages: Vec<MemoryPage> = (0..6).map(report_page).collect();

    let mut outputs = Vec::new();
    for workers in [1, 8] {
        let config = TranslationConfig::builder()
            .provider(ProviderKind::Dictionary)
            .dictionary(dictionary(&report_entries()))
            .max_workers(workers)
            .build()
            .unwrap();
        let ctx = context(&config).await;
        outputs.push(to_json(&translate_pages(&pages, &config, &ctx).await));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn stream_matches_batch_output() {
    let config = config_with(&report_entries());
    let ctx = context(&config).await;
    let pages: Vec<MemoryPage> = (0..4).map(report_page).collect();

    let batch = translate_pages(&pages, &config, &ctx).await;
    let mut streamed: Vec<PageOutput> = translate_stream(&pages, &config, &ctx).collect().await;
    streamed.sort_by_key(|p| p.index);
    assert_eq!(to_json(&batch), to_json(&streamed));
}
