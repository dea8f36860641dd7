//! Debug images: detected blocks, reading order and final placements.
//!
//! Each page is drawn onto its raster (or a white canvas of the same
//! aspect):
//!
//! * column blocks in blue, full-width bands in purple;
//! * a line from each block's centre to the next in reading order;
//! * the rank at each block's top-left corner when a label font is found;
//! * rendered placements in green, or red when they overflowed.

use crate::config::FontSet;
use crate::geometry::Rect;
use crate::page::PageModel;
use crate::pipeline::encode::encode_png;
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect as PixelRect;
use std::path::{Path, PathBuf};
use tracing::debug;

const COLUMN: Rgba<u8> = Rgba([66, 135, 245, 255]);
const BAND: Rgba<u8> = Rgba([156, 39, 176, 255]);
const ORDER: Rgba<u8> = Rgba([255, 152, 0, 255]);
const PLACED: Rgba<u8> = Rgba([76, 175, 80, 255]);
const OVERFLOW: Rgba<u8> = Rgba([244, 67, 54, 255]);

/// Fonts tried for rank labels when none is configured.
const SYSTEM_LABEL_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct DebugRenderer {
    dpi: u32,
    label_font: Option<FontVec>,
}

impl DebugRenderer {
    pub fn new(fonts: &FontSet, dpi: u32) -> Self {
        let candidates = fonts
            .latin
            .iter()
            .cloned()
            .chain(SYSTEM_LABEL_FONTS.iter().map(PathBuf::from));
        let label_font = candidates.filter_map(|p| load(&p)).next();
        if label_font.is_none() {
            debug!("No label font found; debug images will omit rank numbers");
        }
        Self { dpi, label_font }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Pixel width matching `page` at the configured DPI.
    pub fn target_width(&self, page: &PageModel) -> u32 {
        ((page.width * self.dpi as f32 / 72.0).round() as u32).max(1)
    }

    /// Draw the overlay onto `raster`, or onto a blank canvas when absent.
    pub fn render(&self, page: &PageModel, raster: Option<&DynamicImage>) -> RgbaImage {
        let mut img = match raster {
            Some(r) => r.to_rgba8(),
            None => {
                let w = self.target_width(page);
                let h = ((page.height / page.width.max(1.0)) * w as f32).round().max(1.0) as u32;
                RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
            }
        };
        let sx = img.width() as f32 / page.width.max(1.0);
        let sy = img.height() as f32 / page.height.max(1.0);

        let mut blocks: Vec<_> = page.blocks.iter().collect();
        blocks.sort_by_key(|b| b.rank);

        for b in &blocks {
            let color = if b.column.is_some() { COLUMN } else { BAND };
            outline(&mut img, &b.bbox.scale(sx, sy), color, 2);
        }
        for pair in blocks.windows(2) {
            let (ax, ay) = pair[0].bbox.center();
            let (bx, by) = pair[1].bbox.center();
            draw_line_segment_mut(&mut img, (ax * sx, ay * sy), (bx * sx, by * sy), ORDER);
        }
        for r in &page.rendered {
            let color = if r.overflow { OVERFLOW } else { PLACED };
            outline(&mut img, &r.bbox.scale(sx, sy), color, 1);
        }
        if let Some(font) = &self.label_font {
            let scale = PxScale::from((12.0 * self.dpi as f32 / 72.0).max(10.0));
            for b in &blocks {
                draw_text_mut(
                    &mut img,
                    ORDER,
                    (b.bbox.x0 * sx) as i32 + 2,
                    (b.bbox.y0 * sy) as i32 + 2,
                    scale,
                    font,
                    &b.rank.to_string(),
                );
            }
        }
        img
    }

    /// Render and encode as PNG.
    pub fn render_png(
        &self,
        page: &PageModel,
        raster: Option<&DynamicImage>,
    ) -> Result<Vec<u8>, image::ImageError> {
        encode_png(&DynamicImage::ImageRgba8(self.render(page, raster)))
    }
}

fn load(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    FontVec::try_from_vec(bytes).ok()
}

/// Hollow rectangle `thickness` pixels wide, clamped to the image.
fn outline(img: &mut RgbaImage, r: &Rect, color: Rgba<u8>, thickness: u32) {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let x0 = r.x0.clamp(0.0, w - 1.0) as i32;
    let y0 = r.y0.clamp(0.0, h - 1.0) as i32;
    let x1 = r.x1.clamp(0.0, w - 1.0) as i32;
    let y1 = r.y1.clamp(0.0, h - 1.0) as i32;
    for t in 0..thickness as i32 {
        let width = (x1 - x0 - 2 * t).max(0) as u32;
        let height = (y1 - y0 - 2 * t).max(0) as u32;
        if width > 0 && height > 0 {
            draw_hollow_rect_mut(img, PixelRect::at(x0 + t, y0 + t).of_size(width, height), color);
        }
    }
}
