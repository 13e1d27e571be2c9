//! Pixel-space box geometry.
//!
//! Boxes are axis-aligned `[x1, y1, x2, y2]` rectangles with the origin at the
//! top-left of the frame. Construction orders the corners so `x2 >= x1` and
//! `y2 >= y1` always hold; divisions use the clamped extents (minimum 1 px).

use serde::{Deserialize, Serialize};

/// Integer pixel bounding box. Serialized as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Build a box from an `(x, y, w, h)` rectangle.
    pub fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x.saturating_add(w), y.saturating_add(h))
    }

    /// Build a box from float corners, truncating toward zero.
    pub fn from_f32(coords: [f32; 4]) -> Self {
        let [x1, y1, x2, y2] = coords.map(|v| if v.is_finite() { v as i32 } else { 0 });
        Self::new(x1, y1, x2, y2)
    }

    /// Extents are `i64`: corners span the full `i32` range.
    pub fn width(&self) -> i64 {
        i64::from(self.x2) - i64::from(self.x1)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }

    /// Width clamped to at least one pixel, safe as a divisor.
    pub fn clamped_width(&self) -> i64 {
        self.width().max(1)
    }

    /// Height clamped to at least one pixel, safe as a divisor.
    pub fn clamped_height(&self) -> i64 {
        self.height().max(1)
    }

    pub fn area(&self) -> i64 {
        self.width().saturating_mul(self.height())
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        iou(self.as_f64(), other.as_f64())
    }

    pub fn as_f64(&self) -> [f64; 4] {
        [
            self.x1 as f64,
            self.y1 as f64,
            self.x2 as f64,
            self.y2 as f64,
        ]
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(value: [i32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(value: BoundingBox) -> Self {
        [value.x1, value.y1, value.x2, value.y2]
    }
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
///
/// Returns a value in `[0, 1]`. Disjoint or touching boxes return `0.0`
/// before the union is computed, so the division never sees a zero union.
pub fn iou(a: [f64; 4], b: [f64; 4]) -> f64 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}
