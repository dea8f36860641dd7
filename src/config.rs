//! Configuration types for layout-preserving PDF translation.
//!
//! All run behaviour is controlled through [`TranslationConfig`], built via
//! [`TranslationConfigBuilder`]. Stage-specific knobs live in small nested
//! structs ([`HeuristicParams`], [`FitParams`], [`MaskParams`],
//! [`LearnedLayoutParams`], [`FontSet`]) so each stage only sees what it uses.
//!
//! The config is immutable once a run starts; every worker holds a clone.

use crate::error::TranslateError;
use crate::lang::Language;
use crate::pipeline::overlay::OverlayMap;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Configuration for one translation run.
///
/// # Example
/// ```rust
/// use pdf_translate::{Language, RenderMode, TranslationConfig};
///
/// let config = TranslationConfig::builder()
///     .target_lang(Language::English)
///     .render_mode(RenderMode::Hybrid)
///     .max_workers(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TranslationConfig {
    /// Source language; `None` detects per translation unit.
    pub source_lang: Option<Language>,

    /// Target language; `None` flips each unit to the other language.
    pub target_lang: Option<Language>,

    /// Translation backend, chosen once per run. Default: Google.
    pub provider: ProviderKind,

    /// Model id for the LLM provider, e.g. "gpt-4o-mini".
    pub model: Option<String>,

    /// edgequake-llm backend name for the LLM provider ("openai", "ollama", ...).
    pub llm_backend: Option<String>,

    /// Phrase table for [`ProviderKind::Dictionary`].
    pub dictionary: BTreeMap<String, String>,

    /// Layout detector variant. Default: heuristic.
    pub layout: LayoutMode,

    /// Settings for the learned layout model.
    pub learned: LearnedLayoutParams,

    /// Heuristic detector thresholds.
    pub heuristic: HeuristicParams,

    /// Reading direction used for column order and tie-breaks. Default: LTR.
    pub direction: ReadingDirection,

    /// How translated text is put back on the page. Default: hybrid.
    pub render_mode: RenderMode,

    /// Font-size fitting and wrapping.
    pub fit: FitParams,

    /// Non-translatable span detection.
    pub mask: MaskParams,

    /// Blocks longer than this are split at sentence-closing line ends. Default: 1200.
    pub max_unit_chars: usize,

    /// Worker-pool size for pages and for provider batches. Default: 4.
    pub max_workers: usize,

    /// Maximum retry attempts for a transient provider failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per provider call timeout in seconds. Default: 45.
    pub api_timeout_secs: u64,

    /// Fill used to erase original text in block and hybrid modes. `None`
    /// picks black behind near-white text and white otherwise. Default: `None`.
    pub erase_color: Option<[u8; 3]>,

    /// TrueType fonts for drawing translated text.
    pub fonts: FontSet,

    /// Explicit placements used verbatim in overlay mode.
    pub overlay_map: Option<OverlayMap>,

    /// Produce per-page PNGs showing blocks and reading order. Default: false.
    pub debug_images: bool,

    /// Raster resolution for debug images. Default: 96.
    pub debug_dpi: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_lang: None,
            target_lang: None,
            provider: ProviderKind::default(),
            model: None,
            llm_backend: None,
            dictionary: BTreeMap::new(),
            layout: LayoutMode::default(),
            learned: LearnedLayoutParams::default(),
            heuristic: HeuristicParams::default(),
            direction: ReadingDirection::default(),
            render_mode: RenderMode::default(),
            fit: FitParams::default(),
            mask: MaskParams::default(),
            max_unit_chars: 1200,
            max_workers: 4,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 45,
            erase_color: None,
            fonts: FontSet::default(),
            overlay_map: None,
            debug_images: false,
            debug_dpi: 96,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("source_lang", &self.source_lang)
            .field("target_lang", &self.target_lang)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("llm_backend", &self.llm_backend)
            .field("dictionary_entries", &self.dictionary.len())
            .field("layout", &self.layout)
            .field("direction", &self.direction)
            .field("render_mode", &self.render_mode)
            .field("fit", &self.fit)
            .field("max_unit_chars", &self.max_unit_chars)
            .field("max_workers", &self.max_workers)
            .field("max_retries", &self.max_retries)
            .field("overlay_map", &self.overlay_map.as_ref().map(|m| m.len()))
            .field("debug_images", &self.debug_images)
            .field("pages", &self.pages)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl TranslationConfig {
    /// Create a new builder for `TranslationConfig`.
    pub fn builder() -> TranslationConfigBuilder {
        TranslationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TranslationConfig`].
#[derive(Debug)]
pub struct TranslationConfigBuilder {
    config: TranslationConfig,
}

impl TranslationConfigBuilder {
    pub fn source_lang(mut self, lang: Language) -> Self {
        self.config.source_lang = Some(lang);
        self
    }

    pub fn target_lang(mut self, lang: Language) -> Self {
        self.config.target_lang = Some(lang);
        self
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn llm_backend(mut self, name: impl Into<String>) -> Self {
        self.config.llm_backend = Some(name.into());
        self
    }

    /// Add one phrase to the dictionary provider's table.
    pub fn dictionary_entry(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.config.dictionary.insert(source.into(), target.into());
        self
    }

    pub fn dictionary(mut self, entries: BTreeMap<String, String>) -> Self {
        self.config.dictionary = entries;
        self
    }

    pub fn layout(mut self, mode: LayoutMode) -> Self {
        self.config.layout = mode;
        self
    }

    pub fn learned(mut self, params: LearnedLayoutParams) -> Self {
        self.config.learned = params;
        self
    }

    pub fn heuristic(mut self, params: HeuristicParams) -> Self {
        self.config.heuristic = params;
        self
    }

    pub fn direction(mut self, direction: ReadingDirection) -> Self {
        self.config.direction = direction;
        self
    }

    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.config.render_mode = mode;
        self
    }

    pub fn fit(mut self, params: FitParams) -> Self {
        self.config.fit = params;
        self
    }

    pub fn mask(mut self, params: MaskParams) -> Self {
        self.config.mask = params;
        self
    }

    pub fn max_unit_chars(mut self, n: usize) -> Self {
        self.config.max_unit_chars = n.max(40);
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn erase_color(mut self, rgb: [u8; 3]) -> Self {
        self.config.erase_color = Some(rgb);
        self
    }

    pub fn fonts(mut self, fonts: FontSet) -> Self {
        self.config.fonts = fonts;
        self
    }

    pub fn overlay_map(mut self, map: OverlayMap) -> Self {
        self.config.overlay_map = Some(map);
        self
    }

    pub fn debug_images(mut self, v: bool) -> Self {
        self.config.debug_images = v;
        self
    }

    pub fn debug_dpi(mut self, dpi: u32) -> Self {
        self.config.debug_dpi = dpi.clamp(36, 300);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslationConfig, TranslateError> {
        let c = &self.config;
        if c.max_workers == 0 {
            return Err(TranslateError::InvalidConfig(
                "max_workers must be ≥ 1".into(),
            ));
        }
        if let (Some(s), Some(t)) = (c.source_lang, c.target_lang) {
            if s == t {
                return Err(TranslateError::InvalidConfig(format!(
                    "source and target language are both '{}'",
                    s.code()
                )));
            }
        }
        c.fit.validate()?;
        c.mask.validate()?;
        if c.heuristic.max_columns == 0 {
            return Err(TranslateError::InvalidConfig(
                "heuristic.max_columns must be ≥ 1".into(),
            ));
        }
        if c.overlay_map.is_some() && c.render_mode != RenderMode::Overlay {
            return Err(TranslateError::InvalidConfig(
                "an overlay map requires render mode 'overlay'".into(),
            ));
        }
        if c.provider == ProviderKind::Dictionary && c.dictionary.is_empty() {
            return Err(TranslateError::InvalidConfig(
                "dictionary provider selected but no entries supplied".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Translation backend. Selected once per run; no mid-run failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Translate (v2 API with a key, public endpoint without).
    #[default]
    Google,
    /// DeepL REST API.
    DeepL,
    /// Chat-completion model via edgequake-llm.
    OpenAi,
    /// Offline phrase table; deterministic.
    Dictionary,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::DeepL => "deepl",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Dictionary => "dictionary",
        }
    }
}

/// Which layout detector turns words into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Heuristic,
    Learned,
}

/// Reassembly strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Draw on top of the original text without erasing it.
    Overlay,
    /// Erase each block and draw at the original size (clamped).
    Block,
    /// Erase each block and shrink-to-fit by binary search.
    #[default]
    Hybrid,
}

/// Script direction for column order, tie-breaks and line alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingDirection {
    #[default]
    Ltr,
    Rtl,
}

// ── Stage parameters ─────────────────────────────────────────────────────

/// Thresholds for the heuristic layout detector. Lengths are in PDF points
/// unless the name ends in `_em` (multiples of the local font size).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicParams {
    /// Minimum vertical overlap, as a fraction of the shorter word height,
    /// for two words to share a line.
    pub line_overlap: f32,
    /// Horizontal gap that splits a line into separate segments.
    pub segment_gap_em: f32,
    /// Upper bound on detected columns.
    pub max_columns: usize,
    /// Gutters narrower than this are closed.
    pub min_gutter: f32,
    /// Segments narrower than this share of the text width vote for columns.
    pub narrow_segment_ratio: f32,
    /// Vertical gap that starts a new block.
    pub block_gap_em: f32,
    /// Font-size ratio that starts a new block.
    pub font_change_ratio: f32,
    /// Tops closer than this are "ambiguous" and tie-broken by x.
    pub tie_tolerance: f32,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            line_overlap: 0.5,
            segment_gap_em: 1.5,
            max_columns: 3,
            min_gutter: 8.0,
            narrow_segment_ratio: 0.55,
            block_gap_em: 0.9,
            font_change_ratio: 1.3,
            tie_tolerance: 3.0,
        }
    }
}

/// Font-size fitting and wrapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParams {
    pub min_font_size: f32,
    pub max_font_size: f32,
    /// Horizontal inset on each side of the region.
    pub margin: f32,
    /// How far a rendered block may exceed its source region on each side.
    pub overflow_tolerance: f32,
    /// Line height as a multiple of font size.
    pub line_spacing: f32,
    /// Binary-search steps for the hybrid shrink search.
    pub search_iterations: u32,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            min_font_size: 6.0,
            max_font_size: 36.0,
            margin: 1.0,
            overflow_tolerance: 2.0,
            line_spacing: 1.2,
            search_iterations: 14,
        }
    }
}

impl FitParams {
    fn validate(&self) -> Result<(), TranslateError> {
        if !(self.min_font_size > 0.0) || self.min_font_size > self.max_font_size {
            return Err(TranslateError::InvalidConfig(format!(
                "font size range {}–{} is invalid",
                self.min_font_size, self.max_font_size
            )));
        }
        if !(self.line_spacing >= 1.0) {
            return Err(TranslateError::InvalidConfig(
                "line_spacing must be ≥ 1.0".into(),
            ));
        }
        if self.margin < 0.0 || self.overflow_tolerance < 0.0 {
            return Err(TranslateError::InvalidConfig(
                "margin and overflow_tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Which inline spans are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskParams {
    pub numbers: bool,
    pub urls: bool,
    pub emails: bool,
    /// Extra regular expressions whose matches are never translated.
    pub pass_through: Vec<String>,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            numbers: true,
            urls: true,
            emails: true,
            pass_through: Vec::new(),
        }
    }
}

impl MaskParams {
    fn validate(&self) -> Result<(), TranslateError> {
        for pattern in &self.pass_through {
            regex::Regex::new(pattern).map_err(|e| {
                TranslateError::InvalidConfig(format!("pass-through pattern {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// External layout-model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedLayoutParams {
    /// Executable speaking the JSON region protocol on stdin/stdout.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Where to fetch weights on first use.
    pub weights_url: Option<String>,
    /// File name of the weights inside the cache directory.
    pub weights_file: String,
    /// Cache directory override; defaults to the platform cache dir.
    pub cache_dir: Option<PathBuf>,
    /// Raster resolution sent to the model.
    pub dpi: u32,
    pub timeout_secs: u64,
}

impl Default for LearnedLayoutParams {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            weights_url: None,
            weights_file: "layout-model.bin".into(),
            cache_dir: None,
            dpi: 150,
            timeout_secs: 120,
        }
    }
}

/// TrueType fonts used when drawing. Without them, pdfium's built-in
/// Helvetica is used, which cannot show Devanagari.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontSet {
    pub latin: Option<PathBuf>,
    pub latin_bold: Option<PathBuf>,
    pub devanagari: Option<PathBuf>,
    pub devanagari_bold: Option<PathBuf>,
}

/// Specifies which pages of the PDF to translate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let c = TranslationConfig::builder().build().expect("defaults are valid");
        assert_eq!(c.max_workers, 4);
        assert_eq!(c.render_mode, RenderMode::Hybrid);
        assert_eq!(c.layout, LayoutMode::Heuristic);
        assert!(c.source_lang.is_none());
    }

    #[test]
    fn same_source_and_target_rejected() {
        let err = TranslationConfig::builder()
            .source_lang(Language::Hindi)
            .target_lang(Language::Hindi)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("hi"));
    }

    #[test]
    fn inverted_font_range_rejected() {
        let fit = FitParams {
            min_font_size: 20.0,
            max_font_size: 10.0,
            ..FitParams::default()
        };
        assert!(TranslationConfig::builder().fit(fit).build().is_err());
    }

    #[test]
    fn bad_pass_through_regex_rejected() {
        let mask = MaskParams {
            pass_through: vec!["(unclosed".into()],
            ..MaskParams::default()
        };
        assert!(TranslationConfig::builder().mask(mask).build().is_err());
    }

    #[test]
    fn overlay_map_requires_overlay_mode() {
        let map = OverlayMap::default();
        let err = TranslationConfig::builder()
            .overlay_map(map.clone())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("overlay"));

        let ok = TranslationConfig::builder()
            .render_mode(RenderMode::Overlay)
            .overlay_map(map)
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn dictionary_provider_needs_entries() {
        assert!(TranslationConfig::builder()
            .provider(ProviderKind::Dictionary)
            .build()
            .is_err());
        assert!(TranslationConfig::builder()
            .provider(ProviderKind::Dictionary)
            .dictionary_entry("hello", "नमस्ते")
            .build()
            .is_ok());
    }

    #[test]
    fn max_workers_clamped_to_one() {
        let c = TranslationConfig::builder().max_workers(0).build().unwrap();
        assert_eq!(c.max_workers, 1);
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(2).to_indices(3), vec![1]);
        assert_eq!(PageSelection::Single(9).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(4), vec![1, 2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
    }
}
