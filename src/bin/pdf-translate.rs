//! CLI binary for pdf-translate.
//!
//! A thin shim over the library crate: it maps flags to
//! `TranslationConfig`, reads the input, supplies credentials from the
//! environment and writes the returned bytes.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_translate::pipeline::input::resolve_input;
use pdf_translate::{
    translate_document, Credentials, FitParams, FontSet, Language, LayoutMode, LearnedLayoutParams,
    MaskParams, OverlayMap, PageSelection, PipelineContext, ProgressCallback, ProviderKind, ReadingDirection,
    RenderMode, TranslatedDocument, TranslationConfig, TranslationProgressCallback,
};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────

/// Progress bar plus one log line per finished page. Pages may finish out
/// of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Translating {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, rendered_blocks: usize) {
        let secs = self.elapsed(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{rendered_blocks:>4} blocks")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} pages translated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages translated  ({} left untouched)",
                if failed == total_pages { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # English → Hindi with Google (public endpoint, no key)
  pdf-translate report.pdf --target hi --font-devanagari NotoSansDevanagari-Regular.ttf

  # Hindi → English with DeepL, pages 1-5
  DEEPL_API_KEY=... pdf-translate --provider deepl --target en --pages 1-5 in.pdf -o out.pdf

  # LLM translation through a local Ollama model
  pdf-translate --provider openai --llm-backend ollama --model llama3.1 in.pdf

  # Offline glossary, keep the original text visible underneath
  pdf-translate --provider dictionary --dictionary glossary.json --mode overlay in.pdf

  # Draw pre-translated text from an overlay map
  pdf-translate --mode overlay --overlay-map placements.json in.pdf

  # Write layout debug images and a JSON report
  pdf-translate --debug-images debug/ --report report.json in.pdf

ENVIRONMENT VARIABLES:
  GOOGLE_TRANSLATE_API_KEY  Google Cloud Translation v2 key
  DEEPL_API_KEY             DeepL key (keys ending in :fx use the free endpoint)
  OPENAI_API_KEY            OpenAI key for --provider openai
  EDGEQUAKE_LLM_PROVIDER    LLM backend override (openai, ollama, ...)
  EDGEQUAKE_MODEL           LLM model override
  PDFIUM_LIB_PATH           Path to libpdfium
  PDF_TRANSLATE_MODEL_CACHE Layout-model weight cache directory
"#;

/// Translate Hindi↔English PDFs while keeping their layout.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-translate",
    version,
    about = "Translate Hindi↔English PDFs while keeping their layout",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output PDF. Default: `<input stem>.<target>.pdf` in the current directory.
    #[arg(short, long, env = "PDF_TRANSLATE_OUTPUT")]
    output: Option<PathBuf>,

    /// Source language (hi, en). Detected per block when omitted.
    #[arg(long, env = "PDF_TRANSLATE_SOURCE")]
    source: Option<Language>,

    /// Target language (hi, en). The opposite of the detected source when omitted.
    #[arg(long, env = "PDF_TRANSLATE_TARGET")]
    target: Option<Language>,

    /// Translation provider.
    #[arg(long, env = "PDF_TRANSLATE_PROVIDER", value_enum, default_value = "google")]
    provider: ProviderArg,

    /// edgequake-llm backend for `--provider openai` (openai, ollama, ...).
    #[arg(long, env = "PDF_TRANSLATE_LLM_BACKEND")]
    llm_backend: Option<String>,

    /// Chat model for `--provider openai`.
    #[arg(long, env = "PDF_TRANSLATE_MODEL")]
    model: Option<String>,

    /// JSON object mapping source phrases to translations.
    #[arg(long, env = "PDF_TRANSLATE_DICTIONARY")]
    dictionary: Option<PathBuf>,

    /// Layout detector.
    #[arg(long, env = "PDF_TRANSLATE_LAYOUT", value_enum, default_value = "heuristic")]
    layout: LayoutArg,

    /// Executable implementing the layout-model protocol.
    #[arg(long, env = "PDF_TRANSLATE_LAYOUT_COMMAND")]
    layout_command: Option<String>,

    /// Extra argument for the layout-model command (repeatable).
    #[arg(long = "layout-arg", env = "PDF_TRANSLATE_LAYOUT_ARGS", value_delimiter = ',')]
    layout_args: Vec<String>,

    /// URL to fetch layout-model weights from on first use.
    #[arg(long, env = "PDF_TRANSLATE_LAYOUT_WEIGHTS_URL")]
    layout_weights_url: Option<String>,

    /// Reassembly mode.
    #[arg(long, env = "PDF_TRANSLATE_MODE", value_enum, default_value = "hybrid")]
    mode: ModeArg,

    /// Overlay map JSON; requires `--mode overlay`.
    #[arg(long, env = "PDF_TRANSLATE_OVERLAY_MAP")]
    overlay_map: Option<PathBuf>,

    /// Right-to-left column order and alignment.
    #[arg(long, env = "PDF_TRANSLATE_RTL")]
    rtl: bool,

    /// TrueType font for Latin text.
    #[arg(long, env = "PDF_TRANSLATE_FONT_LATIN")]
    font_latin: Option<PathBuf>,

    /// TrueType font for bold Latin text.
    #[arg(long, env = "PDF_TRANSLATE_FONT_LATIN_BOLD")]
    font_latin_bold: Option<PathBuf>,

    /// TrueType font for Devanagari text (required for readable Hindi output).
    #[arg(long, env = "PDF_TRANSLATE_FONT_DEVANAGARI")]
    font_devanagari: Option<PathBuf>,

    /// TrueType font for bold Devanagari text.
    #[arg(long, env = "PDF_TRANSLATE_FONT_DEVANAGARI_BOLD")]
    font_devanagari_bold: Option<PathBuf>,

    /// Smallest font size the fitter may choose.
    #[arg(long, env = "PDF_TRANSLATE_MIN_FONT", default_value_t = 6.0)]
    min_font: f32,

    /// Largest font size the fitter may choose.
    #[arg(long, env = "PDF_TRANSLATE_MAX_FONT", default_value_t = 36.0)]
    max_font: f32,

    /// Regex whose matches are never translated (repeatable).
    #[arg(long = "keep", env = "PDF_TRANSLATE_KEEP", value_delimiter = ',')]
    keep: Vec<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF_TRANSLATE_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_TRANSLATE_PASSWORD")]
    password: Option<String>,

    /// Pages and provider batches in flight at once.
    #[arg(short = 'j', long, env = "PDF_TRANSLATE_MAX_WORKERS", default_value_t = 4)]
    max_workers: usize,

    /// Retries per batch on transient provider errors.
    #[arg(long, env = "PDF_TRANSLATE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call provider timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_API_TIMEOUT", default_value_t = 45)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Directory for per-page layout debug PNGs.
    #[arg(long, env = "PDF_TRANSLATE_DEBUG_IMAGES")]
    debug_images: Option<PathBuf>,

    /// Write a JSON report (per-page outputs and stats) to this file.
    #[arg(long, env = "PDF_TRANSLATE_REPORT")]
    report: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PDF_TRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_TRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_TRANSLATE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProviderArg {
    Google,
    Deepl,
    Openai,
    Dictionary,
}

impl From<ProviderArg> for ProviderKind {
    fn from(v: ProviderArg) -> Self {
        match v {
            ProviderArg::Google => ProviderKind::Google,
            ProviderArg::Deepl => ProviderKind::DeepL,
            ProviderArg::Openai => ProviderKind::OpenAi,
            ProviderArg::Dictionary => ProviderKind::Dictionary,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Heuristic,
    Learned,
}

impl From<LayoutArg> for LayoutMode {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::Heuristic => LayoutMode::Heuristic,
            LayoutArg::Learned => LayoutMode::Learned,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Overlay,
    Block,
    Hybrid,
}

impl From<ModeArg> for RenderMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Overlay => RenderMode::Overlay,
            ModeArg::Block => RenderMode::Block,
            ModeArg::Hybrid => RenderMode::Hybrid,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn TranslationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;

    let bytes = resolve_input(&cli.input, cli.download_timeout)
        .await
        .with_context(|| format!("Cannot read input '{}'", cli.input))?;

    let ctx = PipelineContext::initialize(&config, &Credentials::from_env())
        .await
        .context("Cannot initialise translation pipeline")?;

    // Ctrl-C stops dispatching new pages; finished pages are still written.
    let cancel = ctx.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} cancelling: pages in flight will finish", yellow("⚠"));
            cancel.cancel();
        }
    });

    let out = translate_document(&bytes, &config, &ctx)
        .await
        .context("Translation failed")?;
    ctx.shutdown();

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input, config.target_lang));
    write_atomic(&output_path, &out.pdf).await?;

    if let Some(dir) = &cli.debug_images {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Cannot create {}", dir.display()))?;
        for img in &out.debug_images {
            let path = dir.join(format!("page-{:04}.png", img.page_index + 1));
            tokio::fs::write(&path, &img.png)
                .await
                .with_context(|| format!("Cannot write {}", path.display()))?;
        }
    }

    if let Some(path) = &cli.report {
        let report = serde_json::json!({
            "pages": out.pages,
            "errors": out.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            "stats": out.stats,
        });
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        write_atomic(path, json.as_bytes()).await?;
    }

    if !cli.quiet {
        print_summary(&out, &output_path);
    }
    Ok(())
}

/// Map CLI args to `TranslationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranslationConfig> {
    let mut builder = TranslationConfig::builder()
        .provider(cli.provider.into())
        .layout(cli.layout.into())
        .render_mode(cli.mode.into())
        .direction(if cli.rtl {
            ReadingDirection::Rtl
        } else {
            ReadingDirection::Ltr
        })
        .fit(FitParams {
            min_font_size: cli.min_font,
            max_font_size: cli.max_font,
            ..FitParams::default()
        })
        .fonts(FontSet {
            latin: cli.font_latin.clone(),
            latin_bold: cli.font_latin_bold.clone(),
            devanagari: cli.font_devanagari.clone(),
            devanagari_bold: cli.font_devanagari_bold.clone(),
        })
        .learned(LearnedLayoutParams {
            command: cli.layout_command.clone(),
            args: cli.layout_args.clone(),
            weights_url: cli.layout_weights_url.clone(),
            ..LearnedLayoutParams::default()
        })
        .pages(parse_pages(&cli.pages)?)
        .max_workers(cli.max_workers)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .debug_images(cli.debug_images.is_some());

    if let Some(lang) = cli.source {
        builder = builder.source_lang(lang);
    }
    if let Some(lang) = cli.target {
        builder = builder.target_lang(lang);
    }
    if let Some(name) = &cli.llm_backend {
        builder = builder.llm_backend(name.clone());
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(pwd) = &cli.password {
        builder = builder.password(pwd.clone());
    }
    if !cli.keep.is_empty() {
        builder = builder.mask(MaskParams {
            pass_through: cli.keep.clone(),
            ..MaskParams::default()
        });
    }
    if let Some(path) = &cli.dictionary {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read dictionary {}", path.display()))?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&json)
            .with_context(|| format!("Dictionary {} is not a JSON object of strings", path.display()))?;
        builder = builder.dictionary(entries);
    }
    if let Some(path) = &cli.overlay_map {
        let map = OverlayMap::from_file(path).context("Invalid overlay map")?;
        builder = builder.overlay_map(map);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `<stem>.<target>.pdf` next to the working directory.
fn default_output(input: &str, target: Option<Language>) -> PathBuf {
    let name = input.rsplit('/').next().unwrap_or(input);
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    let suffix = target.map(|l| l.code()).unwrap_or("translated");
    PathBuf::from(format!("{stem}.{suffix}.pdf"))
}

/// Write to a temp file, then rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Cannot write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Cannot move output into place at {}", path.display()))?;
    Ok(())
}

fn print_summary(out: &TranslatedDocument, output_path: &Path) {
    let s = &out.stats;
    eprintln!(
        "{}  {}/{} pages  {} units  {}ms  →  {}",
        if s.failed_pages == 0 { green("✔") } else { yellow("⚠") },
        s.translated_pages,
        s.selected_pages,
        s.units,
        s.total_duration_ms,
        bold(&output_path.display().to_string()),
    );
    if s.failed_units > 0 || s.overflow_blocks > 0 {
        eprintln!(
            "   {} units shown untranslated  /  {} blocks clipped",
            dim(&s.failed_units.to_string()),
            dim(&s.overflow_blocks.to_string()),
        );
    }
    for p in out.pages.iter().filter(|p| p.flags.masking_skipped) {
        eprintln!("   {} page {}: masking skipped for a unit", dim("·"), p.page_num());
    }
    for e in &out.errors {
        eprintln!("   {} {}", red("✗"), e);
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();
    if s == "all" {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
