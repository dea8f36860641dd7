//! Text width measurement for wrapping and fitting.
//!
//! With a TrueType font configured for a script, advances come from the
//! font's `hmtx` table via ab_glyph. Otherwise an average-advance table is
//! used: Latin 0.5 em, Devanagari 0.6 em, space 0.28 em, combining signs 0.

use crate::config::FontSet;
use crate::lang::{is_devanagari, Script};
use ab_glyph::{Font, FontVec};
use std::path::Path;
use tracing::{debug, warn};

/// Average advances in em.
const LATIN_ADVANCE: f32 = 0.5;
const DEVANAGARI_ADVANCE: f32 = 0.6;
const SPACE_ADVANCE: f32 = 0.28;

/// Measures rendered text width in points.
#[derive(Default)]
pub struct TextMeasurer {
    latin: Option<FontVec>,
    devanagari: Option<FontVec>,
}

impl std::fmt::Debug for TextMeasurer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextMeasurer")
            .field("latin", &self.latin.is_some())
            .field("devanagari", &self.devanagari.is_some())
            .finish()
    }
}

impl TextMeasurer {
    /// Table-only measurer.
    pub fn table() -> Self {
        Self::default()
    }

    /// Load the regular faces of `fonts`. A face that cannot be read falls
    /// back to the table for its script.
    pub fn from_fonts(fonts: &FontSet) -> Self {
        Self {
            latin: fonts.latin.as_deref().and_then(load_font),
            devanagari: fonts.devanagari.as_deref().and_then(load_font),
        }
    }

    pub fn has_font(&self, script: Script) -> bool {
        match script {
            Script::Latin => self.latin.is_some(),
            Script::Devanagari => self.devanagari.is_some(),
        }
    }

    /// Width of `text` at `size` points.
    pub fn width(&self, text: &str, size: f32) -> f32 {
        text.chars().map(|c| self.advance(c)).sum::<f32>() * size
    }

    /// Advance of one character in em.
    fn advance(&self, c: char) -> f32 {
        let font = if is_devanagari(c) {
            self.devanagari.as_ref()
        } else {
            self.latin.as_ref()
        };
        if let Some(font) = font {
            if let Some(upem) = font.units_per_em() {
                let id = font.glyph_id(c);
                if id.0 != 0 || c.is_whitespace() {
                    return font.h_advance_unscaled(id) / upem;
                }
            }
        }
        table_advance(c)
    }
}

fn table_advance(c: char) -> f32 {
    if c.is_whitespace() {
        SPACE_ADVANCE
    } else if is_devanagari(c) {
        // combining signs take no advance of their own
        if is_devanagari_mark(c) {
            0.0
        } else {
            DEVANAGARI_ADVANCE
        }
    } else {
        LATIN_ADVANCE
    }
}

/// Matras, virama and other combining Devanagari signs.
fn is_devanagari_mark(c: char) -> bool {
    matches!(c,
        '\u{0900}'..='\u{0903}'
        | '\u{093A}'..='\u{094F}'
        | '\u{0951}'..='\u{0957}'
        | '\u{0962}'..='\u{0963}')
        && c != '\u{093D}'
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!("Cannot read font {}: {}; using average advances", path.display(), e);
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => {
            debug!("Loaded font {}", path.display());
            Some(font)
        }
        Err(e) => {
            warn!("Cannot parse font {}: {}; using average advances", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_widths() {
        let m = TextMeasurer::table();
        assert!((m.width("ab", 10.0) - 10.0).abs() < 1e-4);
        assert!((m.width(" ", 10.0) - 2.8).abs() < 1e-4);
        assert!((m.width("नम", 10.0) - 12.0).abs() < 1e-4);
    }

    #[test]
    fn matras_take_no_advance() {
        let m = TextMeasurer::table();
        // न + ि
        assert!((m.width("नि", 10.0) - 6.0).abs() < 1e-4);
    }

    #[test]
    fn missing_font_falls_back_to_table() {
        let fonts = FontSet {
            latin: Some("/nonexistent/font.ttf".into()),
            ..FontSet::default()
        };
        let m = TextMeasurer::from_fonts(&fonts);
        assert!(!m.has_font(Script::Latin));
        assert!((m.width("a", 12.0) - 6.0).abs() < 1e-4);
    }
}
