//! Page-space geometry shared by every pipeline stage.
//!
//! All coordinates are PDF points with a **top-left** origin: `y` grows
//! downwards. pdfium reports bottom-left coordinates; the conversion happens
//! once, at extraction time in [`crate::pipeline::pdf`], and again when
//! writing draw operations back.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle `(x0, y0)`–`(x1, y1)` with `x0 <= x1`, `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Build a rectangle, normalising swapped corners.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// `true` when the rectangle has no positive area.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Union of a sequence of rectangles, `None` when empty.
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
        rects.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(a) => Some(a.union(r)),
        })
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        if r.x0 < r.x1 && r.y0 < r.y1 {
            Some(r)
        } else {
            None
        }
    }

    /// Grow by `pad` on every side.
    pub fn expand(&self, pad: f32) -> Rect {
        Rect {
            x0: self.x0 - pad,
            y0: self.y0 - pad,
            x1: self.x1 + pad,
            y1: self.y1 + pad,
        }
    }

    /// Clamp into `bounds`. Returns `self` unchanged when it is already inside.
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        Rect {
            x0: self.x0.clamp(bounds.x0, bounds.x1),
            y0: self.y0.clamp(bounds.y0, bounds.y1),
            x1: self.x1.clamp(bounds.x0, bounds.x1),
            y1: self.y1.clamp(bounds.y0, bounds.y1),
        }
    }

    /// Whether `other` lies entirely inside `self`, with `eps` slack.
    pub fn contains_rect(&self, other: &Rect, eps: f32) -> bool {
        other.x0 >= self.x0 - eps
            && other.y0 >= self.y0 - eps
            && other.x1 <= self.x1 + eps
            && other.y1 <= self.y1 + eps
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Length of the shared vertical extent (0 when disjoint).
    pub fn vertical_overlap(&self, other: &Rect) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    /// Length of the shared horizontal extent (0 when disjoint).
    pub fn horizontal_overlap(&self, other: &Rect) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// Scale both axes, e.g. pixel space → page space.
    pub fn scale(&self, sx: f32, sy: f32) -> Rect {
        Rect::new(self.x0 * sx, self.y0 * sy, self.x1 * sx, self.y1 * sy)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

/// A closed polygon in some coordinate space, as returned by layout models.
/// Serialises as a bare list of `[x, y]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub points: Vec<(f32, f32)>,
}

impl Polygon {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        Self { points }
    }

    pub fn from_rect(r: &Rect) -> Self {
        Self::new(vec![(r.x0, r.y0), (r.x1, r.y0), (r.x1, r.y1), (r.x0, r.y1)])
    }

    pub fn bounds(&self) -> Option<Rect> {
        let first = self.points.first()?;
        let mut r = Rect::new(first.0, first.1, first.0, first.1);
        for &(x, y) in &self.points[1..] {
            r = r.union(&Rect::new(x, y, x, y));
        }
        Some(r)
    }

    /// Shoelace area; absolute value so winding does not matter.
    pub fn area(&self) -> f32 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            acc += x0 * y1 - x1 * y0;
        }
        (acc / 2.0).abs()
    }

    /// Even-odd ray casting point test.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.points[i];
            let (xj, yj) = self.points[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Polygon {
        Polygon::new(self.points.iter().map(|&(x, y)| (x * sx, y * sy)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalises_corners() {
        let r = Rect::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(r, Rect { x0: 0.0, y0: 5.0, x1: 10.0, y1: 20.0 });
    }

    #[test]
    fn union_and_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 20.0, 20.0);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(a.intersect(&b), Some(Rect::new(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(a.intersect(&Rect::new(11.0, 0.0, 12.0, 1.0)), None);
    }

    #[test]
    fn overlaps() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(4.0, 8.0, 30.0, 12.0);
        assert_eq!(a.vertical_overlap(&b), 2.0);
        assert_eq!(a.horizontal_overlap(&b), 6.0);
    }

    #[test]
    fn union_all_empty_is_none() {
        assert!(Rect::union_all(std::iter::empty()).is_none());
    }

    #[test]
    fn polygon_contains_and_area() {
        let p = Polygon::from_rect(&Rect::new(0.0, 0.0, 4.0, 2.0));
        assert!(p.contains(1.0, 1.0));
        assert!(!p.contains(5.0, 1.0));
        assert_eq!(p.area(), 8.0);
    }

    #[test]
    fn polygon_triangle_contains() {
        let p = Polygon::new(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        assert!(p.contains(2.0, 2.0));
        assert!(!p.contains(8.0, 8.0));
    }
}
