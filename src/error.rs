//! Error types for the pdf-translate library.
//!
//! Failures are scoped to the smallest unit that can absorb them:
//!
//! * [`TranslateError`] is **fatal**: the run cannot start or the document
//!   cannot be parsed at all (corrupt PDF, wrong password, missing provider).
//!   Returned as `Err` from the top-level `translate*` functions with no
//!   partial output.
//!
//! * [`PageError`] is **non-fatal** and page-scoped: the page is left untouched
//!   and the error is stored in [`crate::output::PageOutput`].
//!
//! * [`ProviderError`], [`MaskingError`], [`LayoutModelError`] and
//!   [`OverlayMapError`] are narrow errors raised inside one stage and
//!   recovered there (retry, skip masking, heuristic fallback, page skip).

use crate::geometry::Rect;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-translate library.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input '{input}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { input: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// Page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Saving the modified document failed.
    #[error("Failed to write translated PDF: {detail}")]
    PdfWriteFailed { detail: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider cannot be built (missing API key etc.).
    #[error("Translation provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The overlay map could not be parsed at all.
    #[error("Invalid overlay map: {0}")]
    InvalidOverlayMap(#[from] OverlayMapError),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform and either:\n\
  • place libpdfium next to the executable, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page is passed through unmodified and flagged as degraded so the
/// caller can surface it.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page has no extractable text layer; OCR it and retry.
    #[error("Page {page}: no extractable text layer (run OCR first)")]
    NoTextLayer { page: usize },

    /// An overlay-map entry referenced this page with unusable geometry.
    #[error("Page {page}: invalid overlay map: {detail}")]
    InvalidOverlayMap { page: usize, detail: String },

    /// pdfium could not read the page.
    #[error("Page {page}: extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// pdfium could not apply the draw operations to the page.
    #[error("Page {page}: writing translated text failed: {detail}")]
    WriteFailed { page: usize, detail: String },

    /// A page worker panicked or was aborted.
    #[error("Page {page}: internal error: {detail}")]
    Internal { page: usize, detail: String },

    /// The run was cancelled before this page was dispatched.
    #[error("Page {page}: cancelled before processing")]
    Cancelled { page: usize },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::NoTextLayer { page }
            | PageError::InvalidOverlayMap { page, .. }
            | PageError::ExtractionFailed { page, .. }
            | PageError::WriteFailed { page, .. }
            | PageError::Internal { page, .. }
            | PageError::Cancelled { page } => *page,
        }
    }
}

/// Failure of a single provider request.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// HTTP 429; honour `retry_after_secs` when the server sent one.
    #[error("rate limited by provider (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection reset, DNS failure and friends.
    #[error("transport error: {0}")]
    Transport(String),

    /// 5xx from the provider.
    #[error("provider returned HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// 401/403: a retry will not help.
    #[error("authentication rejected (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// Character quota exhausted (DeepL answers 456).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("bad request (HTTP {status}): {detail}")]
    BadRequest { status: u16, detail: String },

    /// The response parsed but does not line up with the request.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Error surfaced by the LLM backend.
    #[error("LLM backend error: {0}")]
    Backend(String),
}

impl ProviderError {
    /// Whether the retry loop should try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Transport(_)
                | ProviderError::Server { .. }
                | ProviderError::Backend(_)
        )
    }

    /// Classify an HTTP status code and response body.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth {
                status,
                detail: body,
            },
            408 => ProviderError::Timeout { secs: 0 },
            429 => ProviderError::RateLimited {
                retry_after_secs: None,
            },
            456 => ProviderError::QuotaExceeded(body),
            s if s >= 500 => ProviderError::Server { status, body },
            _ => ProviderError::BadRequest {
                status,
                detail: body,
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout { secs: 0 }
        } else if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Masking could not be applied to a unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MaskingError {
    /// The source already contains a placeholder delimiter.
    #[error("unit text contains placeholder delimiter {marker:?}; masking skipped")]
    Collision { marker: char },
}

/// The external layout capability could not produce regions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutModelError {
    /// Model missing, weights not downloadable, process failed to start.
    #[error("layout model unavailable: {0}")]
    Unavailable(String),

    /// The model ran but its output could not be interpreted.
    #[error("layout model returned invalid output: {0}")]
    InvalidOutput(String),
}

/// Problems with a user-supplied overlay map.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverlayMapError {
    #[error("cannot parse overlay map: {0}")]
    Parse(String),

    #[error("overlay map references page {page} but the document has {total} pages")]
    PageOutOfRange { page: usize, total: usize },

    #[error("overlay entry {bbox:?} on page {page} lies outside the page ({width}x{height})")]
    OutOfBounds {
        page: usize,
        bbox: Rect,
        width: f32,
        height: f32,
    },
}
