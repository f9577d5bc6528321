use serde::{Deserialize, Serialize};

/// Corner coordinates are clamped to this magnitude before conversion so
/// that box arithmetic stays in range. NaN maps to 0.
const COORD_LIMIT: f64 = (i32::MAX / 2) as f64;

/// Axis-aligned box in pixel units: origin `(x, y)`, extent `(w, h)`.
///
/// Serialises as `[x, y, w, h]`, the shape consumers of the track mapping
/// expect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Builds a box from corner coordinates, forcing width and height to at
    /// least one pixel.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let x = to_coord(x1);
        let y = to_coord(y1);
        Self {
            x,
            y,
            w: to_coord(x2).saturating_sub(x).max(1),
            h: to_coord(y2).saturating_sub(y).max(1),
        }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    pub fn area(&self) -> f64 {
        let w = self.right().saturating_sub(self.x).max(0);
        let h = self.bottom().saturating_sub(self.y).max(0);
        w as f64 * h as f64
    }

    /// Intersection over union, in `[0, 1]`. Degenerate boxes score 0.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let inter = ix2.saturating_sub(ix1).max(0) as f64 * iy2.saturating_sub(iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        inter / (self.area() + other.area() - inter)
    }

    /// Clips the box to a `width` × `height` image.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let (iw, ih) = (width as i32, height as i32);
        if iw <= 0 || ih <= 0 {
            return None;
        }
        let x1 = self.x.clamp(0, iw);
        let y1 = self.y.clamp(0, ih);
        let x2 = self.right().clamp(0, iw);
        let y2 = self.bottom().clamp(0, ih);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

fn to_coord(v: f64) -> i32 {
    v.clamp(-COORD_LIMIT, COORD_LIMIT) as i32
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}
