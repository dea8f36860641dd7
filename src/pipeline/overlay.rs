//! User-supplied overlay maps.
//!
//! An overlay map places text at explicit coordinates and bypasses layout
//! detection and translation entirely. Two JSON shapes are accepted:
//!
//! ```json
//! {"pages": {"0": [{"bbox": [72, 90, 300, 110], "text": "नमस्ते", "font_size": 12}]}}
//! ```
//!
//! ```json
//! [{"page": 0, "bbox": [72, 90, 300, 110], "translated_text": "नमस्ते", "fontsize": 12}]
//! ```
//!
//! Page indices are 0-based; `bbox` is `[x0, y0, x1, y1]` in points with a
//! top-left origin. In the flat form `text` wins over `translated_text`.

use crate::error::OverlayMapError;
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Font size used when an entry does not name one.
pub const DEFAULT_OVERLAY_FONT_SIZE: f32 = 11.5;

/// Slack allowed when checking boxes against page bounds.
const BOUNDS_EPS: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayEntry {
    pub bbox: Rect,
    pub text: String,
    pub font_size: f32,
}

/// Overlay entries grouped by 0-based page index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayMap {
    pages: BTreeMap<usize, Vec<OverlayEntry>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMap {
    Keyed { pages: BTreeMap<String, Vec<KeyedEntry>> },
    Flat(Vec<FlatEntry>),
}

#[derive(Deserialize)]
struct KeyedEntry {
    bbox: [f32; 4],
    #[serde(default)]
    text: String,
    #[serde(default, alias = "fontsize")]
    font_size: Option<f32>,
}

#[derive(Deserialize)]
struct FlatEntry {
    page: usize,
    bbox: [f32; 4],
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    translated_text: Option<String>,
    #[serde(default, alias = "fontsize")]
    font_size: Option<f32>,
}

fn entry(bbox: [f32; 4], text: String, font_size: Option<f32>) -> OverlayEntry {
    OverlayEntry {
        bbox: Rect::new(bbox[0], bbox[1], bbox[2], bbox[3]),
        text,
        font_size: font_size
            .filter(|s| *s > 0.0)
            .unwrap_or(DEFAULT_OVERLAY_FONT_SIZE),
    }
}

impl OverlayMap {
    pub fn from_json(json: &str) -> Result<Self, OverlayMapError> {
        let raw: RawMap =
            serde_json::from_str(json).map_err(|e| OverlayMapError::Parse(e.to_string()))?;
        let mut map = OverlayMap::default();
        match raw {
            RawMap::Keyed { pages } => {
                for (key, entries) in pages {
                    let page: usize = key
                        .trim()
                        .parse()
                        .map_err(|_| OverlayMapError::Parse(format!("page key {key:?} is not an index")))?;
                    for e in entries {
                        map.push(page, entry(e.bbox, e.text, e.font_size));
                    }
                }
            }
            RawMap::Flat(entries) => {
                for e in entries {
                    let text = e
                        .text
                        .filter(|t| !t.is_empty())
                        .or(e.translated_text)
                        .unwrap_or_default();
                    map.push(e.page, entry(e.bbox, text, e.font_size));
                }
            }
        }
        Ok(map)
    }

    pub fn from_file(path: &Path) -> Result<Self, OverlayMapError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| OverlayMapError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn push(&mut self, page: usize, entry: OverlayEntry) {
        self.pages.entry(page).or_default().push(entry);
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries for one page, empty when the map does not mention it.
    pub fn entries(&self, page: usize) -> &[OverlayEntry] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Page indices mentioned by the map, ascending.
    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.keys().copied()
    }

    /// One error per referenced page that the document does not have.
    pub fn out_of_range(&self, total: usize) -> Vec<OverlayMapError> {
        self.pages()
            .filter(|&p| p >= total)
            .map(|page| OverlayMapError::PageOutOfRange { page, total })
            .collect()
    }

    /// Check every entry of `page` lies within a `width × height` page.
    pub fn check_bounds(&self, page: usize, width: f32, height: f32) -> Result<(), OverlayMapError> {
        let bounds = Rect::new(0.0, 0.0, width, height);
        for e in self.entries(page) {
            if e.bbox.is_degenerate() || !bounds.contains_rect(&e.bbox, BOUNDS_EPS) {
                return Err(OverlayMapError::OutOfBounds {
                    page,
                    bbox: e.bbox,
                    width,
                    height,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keyed_form() {
        let map = OverlayMap::from_json(
            r#"{"pages": {"1": [{"bbox": [10, 20, 110, 40], "text": "hello", "font_size": 14}]}}"#,
        )
        .unwrap();
        assert_eq!(map.len(), 1);
        let e = &map.entries(1)[0];
        assert_eq!(e.text, "hello");
        assert_eq!(e.font_size, 14.0);
        assert_eq!(e.bbox, Rect::new(10.0, 20.0, 110.0, 40.0));
        assert!(map.entries(0).is_empty());
    }

    #[test]
    fn parses_flat_form_with_defaults() {
        let map = OverlayMap::from_json(
            r#"[{"page": 0, "bbox": [0, 0, 50, 10], "translated_text": "नमस्ते"},
                {"page": 0, "bbox": [0, 20, 50, 30], "text": "a", "translated_text": "b", "fontsize": 9}]"#,
        )
        .unwrap();
        let entries = map.entries(0);
        assert_eq!(entries[0].text, "नमस्ते");
        assert_eq!(entries[0].font_size, DEFAULT_OVERLAY_FONT_SIZE);
        assert_eq!(entries[1].text, "a");
        assert_eq!(entries[1].font_size, 9.0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            OverlayMap::from_json("{\"nope\": 1}"),
            Err(OverlayMapError::Parse(_))
        ));
        assert!(matches!(
            OverlayMap::from_json(r#"{"pages": {"x": []}}"#),
            Err(OverlayMapError::Parse(_))
        ));
    }

    #[test]
    fn page_range_and_bounds() {
        let map = OverlayMap::from_json(
            r#"[{"page": 0, "bbox": [0, 0, 700, 10], "text": "wide"},
                {"page": 5, "bbox": [0, 0, 10, 10], "text": "far"}]"#,
        )
        .unwrap();
        let errors = map.out_of_range(2);
        assert_eq!(errors, vec![OverlayMapError::PageOutOfRange { page: 5, total: 2 }]);
        assert!(matches!(
            map.check_bounds(0, 612.0, 792.0),
            Err(OverlayMapError::OutOfBounds { page: 0, .. })
        ));
        assert!(map.check_bounds(1, 612.0, 792.0).is_ok());
    }
}
