//! pdfium backend: text-layer extraction, rasterisation and writing.
//!
//! Everything here is blocking and must run inside
//! `tokio::task::spawn_blocking`. pdfium wraps a C++ library with
//! thread-local state; the `thread_safe` feature of pdfium-render serialises
//! access, but calls still block.
//!
//! ## Coordinates
//!
//! pdfium reports bottom-left-origin points. Extraction flips `y` once
//! (`y_top = page_height - y_pdf`) so the rest of the crate works top-down;
//! writing flips it back.
//!
//! ## Binding
//!
//! 1. `PDFIUM_LIB_PATH`, when it points at a file;
//! 2. a library next to the working directory (`./libpdfium.so` etc.);
//! 3. the system library search path.

use crate::config::{FontSet, PageSelection};
use crate::error::{PageError, TranslateError};
use crate::geometry::Rect;
use crate::lang::Script;
use crate::page::{Glyph, PageInput, PageModel, PageSource};
use crate::pipeline::reassemble::DrawOp;
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bind to a pdfium shared library.
pub fn bind_pdfium() -> Result<Pdfium, TranslateError> {
    if let Ok(p) = std::env::var("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(&p);
        if path.is_file() {
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| TranslateError::PdfiumBindingFailed(format!("{}: {e}", path.display())));
        }
        warn!("PDFIUM_LIB_PATH '{}' is not a file; trying default locations", p);
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| TranslateError::PdfiumBindingFailed(e.to_string()))
}

fn open<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, TranslateError> {
    pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                TranslateError::WrongPassword
            } else {
                TranslateError::PasswordRequired
            }
        } else {
            TranslateError::CorruptPdf { detail: err_str }
        }
    })
}

// ── Extraction ───────────────────────────────────────────────────────────

/// A pdfium page viewed as a glyph source.
pub struct PdfPageSource<'a> {
    index: usize,
    page: &'a PdfPage<'a>,
}

impl<'a> PdfPageSource<'a> {
    pub fn new(index: usize, page: &'a PdfPage<'a>) -> Self {
        Self { index, page }
    }
}

impl PageSource for PdfPageSource<'_> {
    fn page_index(&self) -> usize {
        self.index
    }

    fn size(&self) -> (f32, f32) {
        (self.page.width().value, self.page.height().value)
    }

    fn glyphs(&self) -> Vec<Glyph> {
        let height = self.page.height().value;
        let text = match self.page.text() {
            Ok(t) => t,
            Err(e) => {
                debug!("Page {}: no text object ({:?})", self.index + 1, e);
                return Vec::new();
            }
        };
        let mut glyphs = Vec::new();
        for c in text.chars().iter() {
            let Some(ch) = c.unicode_char() else {
                continue;
            };
            let bbox = match c.loose_bounds() {
                Ok(b) => Rect::new(
                    b.left().value,
                    height - b.top().value,
                    b.right().value,
                    height - b.bottom().value,
                ),
                Err(_) if ch.is_whitespace() => Rect::default(),
                Err(_) => continue,
            };
            let color = c
                .fill_color()
                .map(|f| [f.red(), f.green(), f.blue()])
                .unwrap_or_default();
            glyphs.push(Glyph {
                ch,
                bbox,
                font_size: c.scaled_font_size().value,
                bold: c.font_name().contains("Bold"),
                color,
            });
        }
        glyphs
    }
}

pub struct LoadedDocument {
    pub total_pages: usize,
    /// Selected pages in ascending index order.
    pub pages: Vec<PageInput>,
}

/// Parse `bytes`, extract the selected pages and optionally rasterise them
/// at `raster_dpi`.
///
/// Unreadable individual pages become [`PageError::ExtractionFailed`];
/// only document-level failures are fatal.
pub fn load_document(
    bytes: &[u8],
    password: Option<&str>,
    selection: &PageSelection,
    raster_dpi: Option<u32>,
) -> Result<LoadedDocument, TranslateError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, bytes, password)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        let page = match selection {
            PageSelection::Single(p) => *p,
            PageSelection::Range(s, _) => *s,
            PageSelection::Set(v) => v.first().copied().unwrap_or(0),
            PageSelection::All => 0,
        };
        return Err(TranslateError::PageOutOfRange {
            page,
            total: total_pages,
        });
    }

    let mut loaded = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = match pages.get(idx as u16) {
            Ok(p) => p,
            Err(e) => {
                loaded.push(PageInput {
                    index: idx,
                    width: 0.0,
                    height: 0.0,
                    model: Err(PageError::ExtractionFailed {
                        page: idx + 1,
                        detail: format!("{:?}", e),
                    }),
                    raster: None,
                });
                continue;
            }
        };
        let (width, height) = (page.width().value, page.height().value);
        let model = PageModel::load(&PdfPageSource::new(idx, &page));
        let raster = raster_dpi.and_then(|dpi| {
            let target = ((width * dpi as f32 / 72.0).round() as i32).max(1);
            let config = PdfRenderConfig::new().set_target_width(target);
            match page.render_with_config(&config) {
                Ok(bitmap) => Some(bitmap.as_image()),
                Err(e) => {
                    warn!("Page {}: rasterisation failed: {:?}", idx + 1, e);
                    None
                }
            }
        });
        debug!(
            "Page {}: {}x{} pt, {} words",
            idx + 1,
            width,
            height,
            model.as_ref().map(|m| m.word_count()).unwrap_or(0)
        );
        loaded.push(PageInput {
            index: idx,
            width,
            height,
            model,
            raster,
        });
    }

    Ok(LoadedDocument {
        total_pages,
        pages: loaded,
    })
}

// ── Writing ──────────────────────────────────────────────────────────────

/// Resolves a pdfium font token per `(script, bold)`, loading TrueType files
/// on first use.
struct FontCache<'f> {
    fonts: &'f FontSet,
    tokens: HashMap<(Script, bool), PdfFontToken>,
    warned_devanagari: bool,
}

impl<'f> FontCache<'f> {
    fn new(fonts: &'f FontSet) -> Self {
        Self {
            fonts,
            tokens: HashMap::new(),
            warned_devanagari: false,
        }
    }

    fn path(&self, script: Script, bold: bool) -> Option<&'f Path> {
        let f = self.fonts;
        let path = match (script, bold) {
            (Script::Latin, false) => f.latin.as_ref(),
            (Script::Latin, true) => f.latin_bold.as_ref().or(f.latin.as_ref()),
            (Script::Devanagari, false) => f.devanagari.as_ref(),
            (Script::Devanagari, true) => f.devanagari_bold.as_ref().or(f.devanagari.as_ref()),
        };
        path.map(PathBuf::as_path)
    }

    fn token(&mut self, document: &mut PdfDocument<'_>, script: Script, bold: bool) -> PdfFontToken {
        if let Some(t) = self.tokens.get(&(script, bold)) {
            return *t;
        }
        let loaded = self.path(script, bold).and_then(|path| {
            match document.fonts_mut().load_true_type_from_file(path, true) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("Cannot embed font {}: {:?}", path.display(), e);
                    None
                }
            }
        });
        let token = match loaded {
            Some(t) => t,
            None => {
                if script == Script::Devanagari && !self.warned_devanagari {
                    warn!("No Devanagari font configured; Hindi text will not display correctly");
                    self.warned_devanagari = true;
                }
                if bold {
                    document.fonts_mut().helvetica_bold()
                } else {
                    document.fonts_mut().helvetica()
                }
            }
        };
        self.tokens.insert((script, bold), token);
        token
    }
}

/// Apply each page's draw operations to a fresh copy of `bytes` and save.
///
/// Returns the new document and the pages whose operations could not be
/// applied. A page's operations land all together or not at all, so a
/// failed page keeps its original text visible.
pub fn write_document(
    bytes: &[u8],
    password: Option<&str>,
    edits: &[(usize, Vec<DrawOp>)],
    fonts: &FontSet,
) -> Result<(Vec<u8>, Vec<PageError>), TranslateError> {
    let pdfium = bind_pdfium()?;
    let mut document = open(&pdfium, bytes, password)?;
    let mut cache = FontCache::new(fonts);
    let mut failures = Vec::new();

    for (idx, ops) in edits {
        if ops.is_empty() {
            continue;
        }
        // resolve fonts before borrowing the page
        let mut tokens = Vec::with_capacity(ops.len());
        for op in ops {
            if let DrawOp::Text { script, bold, .. } = op {
                tokens.push(Some(cache.token(&mut document, *script, *bold)));
            } else {
                tokens.push(None);
            }
        }
        let applied = document
            .pages()
            .get(*idx as u16)
            .map_err(|e| format!("cannot open page: {:?}", e))
            .and_then(|page| apply_ops(&mut PdfCanvas::new(page), ops, &tokens));
        if let Err(detail) = applied {
            warn!("Page {}: {}", idx + 1, detail);
            failures.push(PageError::WriteFailed {
                page: idx + 1,
                detail,
            });
        }
    }

    let out = document
        .save_to_bytes()
        .map_err(|e| TranslateError::PdfWriteFailed {
            detail: format!("{:?}", e),
        })?;
    info!("Wrote {} bytes", out.len());
    Ok((out, failures))
}

/// A page the writer draws on.
trait Canvas {
    type Font: Copy;
    type Handle;

    /// Draw one operation. `Ok(None)` means nothing was drawn.
    fn draw(&mut self, op: &DrawOp, font: Option<Self::Font>) -> Result<Option<Self::Handle>, String>;

    fn remove(&mut self, handle: Self::Handle) -> Result<(), String>;
}

struct PdfCanvas<'a> {
    page: PdfPage<'a>,
    height: f32,
}

impl<'a> PdfCanvas<'a> {
    fn new(page: PdfPage<'a>) -> Self {
        let height = page.height().value;
        Self { page, height }
    }
}

impl<'a> Canvas for PdfCanvas<'a> {
    type Font = PdfFontToken;
    type Handle = PdfPageObject<'a>;

    fn draw(&mut self, op: &DrawOp, font: Option<PdfFontToken>) -> Result<Option<PdfPageObject<'a>>, String> {
        let height = self.height;
        match op {
            DrawOp::Erase { rect, color } => {
                let pdf_rect = PdfRect::new_from_values(
                    height - rect.y1,
                    rect.x0,
                    height - rect.y0,
                    rect.x1,
                );
                let fill = PdfColor::new(color[0], color[1], color[2], 255);
                self.page
                    .objects_mut()
                    .create_path_object_rect(pdf_rect, None, None, Some(fill))
                    .map(Some)
                    .map_err(|e| format!("erase failed: {:?}", e))
            }
            DrawOp::Text {
                text,
                x,
                baseline,
                font_size,
                color,
                ..
            } => {
                let Some(font) = font else {
                    return Ok(None);
                };
                let mut object = self
                    .page
                    .objects_mut()
                    .create_text_object(
                        PdfPoints::new(*x),
                        PdfPoints::new(height - baseline),
                        text,
                        font,
                        PdfPoints::new(*font_size),
                    )
                    .map_err(|e| format!("text failed: {:?}", e))?;
                let ink = PdfColor::new(color[0], color[1], color[2], 255);
                if let Err(e) = object.set_fill_color(ink) {
                    let _ = self.page.objects_mut().remove_object(object);
                    return Err(format!("text colour failed: {:?}", e));
                }
                Ok(Some(object))
            }
        }
    }

    fn remove(&mut self, handle: PdfPageObject<'a>) -> Result<(), String> {
        self.page
            .objects_mut()
            .remove_object(handle)
            .map(|_| ())
            .map_err(|e| format!("{:?}", e))
    }
}

/// Draw `ops` in order. On the first failure every object already added is
/// removed again and the error is returned.
fn apply_ops<C: Canvas>(canvas: &mut C, ops: &[DrawOp], fonts: &[Option<C::Font>]) -> Result<(), String> {
    let mut added = Vec::with_capacity(ops.len());
    for (op, font) in ops.iter().zip(fonts) {
        match canvas.draw(op, *font) {
            Ok(Some(handle)) => added.push(handle),
            Ok(None) => {}
            Err(detail) => {
                let stuck = added
                    .into_iter()
                    .rev()
                    .filter_map(|h| canvas.remove(h).err())
                    .count();
                if stuck > 0 {
                    return Err(format!("{detail}; {stuck} object(s) could not be rolled back"));
                }
                return Err(detail);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records drawn operations; fails on the `fail_at`-th draw.
    #[derive(Default)]
    struct Recorder {
        drawn: Vec<(usize, DrawOp)>,
        next: usize,
        fail_at: Option<usize>,
    }

    impl Canvas for Recorder {
        type Font = ();
        type Handle = usize;

        fn draw(&mut self, op: &DrawOp, font: Option<()>) -> Result<Option<usize>, String> {
            if matches!(op, DrawOp::Text { .. }) && font.is_none() {
                return Ok(None);
            }
            let n = self.next;
            self.next += 1;
            if self.fail_at == Some(n) {
                return Err("text failed".into());
            }
            self.drawn.push((n, op.clone()));
            Ok(Some(n))
        }

        fn remove(&mut self, handle: usize) -> Result<(), String> {
            let before = self.drawn.len();
            self.drawn.retain(|(n, _)| *n != handle);
            if self.drawn.len() == before {
                return Err("unknown object".into());
            }
            Ok(())
        }
    }

    fn erase(y: f32) -> DrawOp {
        DrawOp::Erase {
            rect: Rect::new(50.0, y, 300.0, y + 14.0),
            color: [255, 255, 255],
        }
    }

    fn text(t: &str, baseline: f32) -> DrawOp {
        DrawOp::Text {
            text: t.into(),
            x: 50.0,
            baseline,
            font_size: 12.0,
            script: Script::Latin,
            bold: false,
            color: [0, 0, 0],
        }
    }

    #[test]
    fn failed_text_rolls_back_erases() {
        let ops = vec![erase(100.0), erase(200.0), text("hello", 110.0)];
        let mut canvas = Recorder {
            fail_at: Some(2),
            ..Recorder::default()
        };
        let err = apply_ops(&mut canvas, &ops, &[None, None, Some(())]).unwrap_err();
        assert_eq!(err, "text failed");
        assert!(canvas.drawn.is_empty(), "{:?}", canvas.drawn);
    }

    #[test]
    fn all_ops_land_when_nothing_fails() {
        let ops = vec![erase(100.0), text("hello", 110.0), text("unfontable", 130.0)];
        let mut canvas = Recorder::default();
        apply_ops(&mut canvas, &ops, &[None, Some(()), None]).unwrap();
        assert_eq!(canvas.drawn.len(), 2);
        assert!(matches!(canvas.drawn[0].1, DrawOp::Erase { .. }));
    }
}
