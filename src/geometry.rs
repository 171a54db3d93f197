//! Viewport Geometry - Content Boxes and Square Framing
//!
//! Pure functions only. Nothing here knows about the scene tree.

use serde::{Deserialize, Serialize};

/// Editor camera used when a scene declares no usable viewBox.
pub const FALLBACK_VIEW_BOX: Rect = Rect { x: 0.0, y: 0.0, w: 1100.0, h: 700.0 };

/// Axis-aligned box in scene units. `w` and `h` are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// A `Rect` used as the camera frame of a render.
pub type Viewport = Rect;

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w: w.max(0.0), h: h.max(0.0) }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Zero width and zero height.
    pub fn is_degenerate(&self) -> bool {
        self.w <= 0.0 && self.h <= 0.0
    }

    pub fn is_square(&self) -> bool {
        self.w == self.h
    }

    /// Formats as an SVG `viewBox` attribute value.
    pub fn to_view_box(&self) -> String {
        format!("{} {} {} {}", self.x, self.y, self.w, self.h)
    }
}

/// Smallest box containing both inputs; an absent side yields the other.
pub fn union_bbox(a: Option<Rect>, b: Option<Rect>) -> Option<Rect> {
    match (a, b) {
        (None, None) => None,
        (Some(r), None) | (None, Some(r)) => Some(r),
        (Some(a), Some(b)) => {
            let x = a.x.min(b.x);
            let y = a.y.min(b.y);
            let right = a.right().max(b.right());
            let bottom = a.bottom().max(b.bottom());
            Some(Rect::new(x, y, right - x, bottom - y))
        }
    }
}

/// Pads `bbox` on every side, then grows the shorter side symmetrically
/// until the result is square.
pub fn square_viewport(bbox: Rect, padding: f64) -> Viewport {
    let x = bbox.x - padding;
    let y = bbox.y - padding;
    let w = bbox.w + 2.0 * padding;
    let h = bbox.h + 2.0 * padding;
    let side = w.max(h);

    Rect::new(x - (side - w) / 2.0, y - (side - h) / 2.0, side, side)
}

/// Parses a `"x y w h"` viewBox string (commas allowed as separators).
///
/// Returns `None` for anything other than four finite numbers with a
/// non-negative size.
pub fn parse_view_box(value: &str) -> Option<Rect> {
    let parts: Vec<f64> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;

    match parts.as_slice() {
        [x, y, w, h] if parts.iter().all(|v| v.is_finite()) && *w >= 0.0 && *h >= 0.0 => {
            Some(Rect::new(*x, *y, *w, *h))
        }
        _ => None,
    }
}

/// Declared viewBox, or the fallback camera when absent or malformed.
pub fn view_box_or_fallback(value: Option<&str>) -> Rect {
    value.and_then(parse_view_box).unwrap_or(FALLBACK_VIEW_BOX)
}
