//! # pdf-translate
//!
//! Translate Hindi↔English text inside PDF documents while keeping the page
//! layout.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Extract    glyphs → words via pdfium (spawn_blocking)
//!  ├─ 2. Layout     heuristic columns/bands, or a learned layout model
//!  ├─ 3. Units      merge/split blocks, mask numbers and URLs
//!  ├─ 4. Translate  Google / DeepL / LLM / dictionary, batched with retry
//!  ├─ 5. Reassemble fit font size, wrap, emit erase + text operations
//!  └─ 6. Write      apply operations and save to bytes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_translate::{translate_document, Credentials, Language, PipelineContext, TranslationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TranslationConfig::builder()
//!         .target_lang(Language::Hindi)
//!         .build()?;
//!     let ctx = PipelineContext::initialize(&config, &Credentials::from_env()).await?;
//!     let bytes = std::fs::read("document.pdf")?;
//!     let out = translate_document(&bytes, &config, &ctx).await?;
//!     std::fs::write("document.hi.pdf", &out.pdf)?;
//!     eprintln!("{} units, {} failed", out.stats.units, out.stats.failed_units);
//!     ctx.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-translate` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! ```toml
//! pdf-translate = { version = "0.1", default-features = false }
//! ```
//!
//! ## Devanagari output
//!
//! pdfium's built-in fonts have no Devanagari glyphs. Point
//! [`FontSet::devanagari`] at a TrueType font (Noto Sans Devanagari, Mangal)
//! when translating into Hindi.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod lang;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod translate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FitParams, FontSet, HeuristicParams, LayoutMode, LearnedLayoutParams, MaskParams, PageSelection,
    ProviderKind, ReadingDirection, RenderMode, TranslationConfig, TranslationConfigBuilder,
};
pub use context::{CancelSignal, PipelineContext};
pub use error::{PageError, TranslateError};
pub use geometry::Rect;
pub use lang::Language;
pub use output::{DebugImage, PageFlags, PageOutput, RunStats, TranslatedDocument, UnitOutcome};
pub use page::{MemoryPage, PageInput, PageModel, PageSource};
pub use pipeline::client::{TranslationResult, TranslationStatus};
pub use pipeline::overlay::OverlayMap;
pub use pipeline::provider::Credentials;
pub use pipeline::reassemble::{DrawOp, RenderedBlock};
pub use progress::{NoopProgressCallback, ProgressCallback, TranslationProgressCallback};
pub use stream::{translate_stream, PageStream};
pub use translate::{translate_document, translate_pages};
