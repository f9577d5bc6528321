/// Hue/saturation histogram appearance descriptor.
///
/// Pixels inside the clamped box are binned into a 2-D hue × saturation
/// grid and the counts are L1-normalised, so crops of different sizes
/// compare directly. Value (brightness) is ignored, which keeps the
/// descriptor stable under moderate lighting changes.
use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;
use crate::tracking::domain::appearance::{AppearanceExtractor, Descriptor};

pub const DEFAULT_HUE_BINS: usize = 16;
pub const DEFAULT_SAT_BINS: usize = 16;

pub struct HsvHistogramExtractor {
    hue_bins: usize,
    sat_bins: usize,
}

impl HsvHistogramExtractor {
    pub fn new(hue_bins: usize, sat_bins: usize) -> Self {
        Self {
            hue_bins: hue_bins.max(1),
            sat_bins: sat_bins.max(1),
        }
    }
}

impl Default for HsvHistogramExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_HUE_BINS, DEFAULT_SAT_BINS)
    }
}

impl AppearanceExtractor for HsvHistogramExtractor {
    fn descriptor_len(&self) -> usize {
        self.hue_bins * self.sat_bins
    }

    fn extract(&self, frame: &Frame, bbox: &BoundingBox) -> Descriptor {
        let mut hist = vec![0.0f32; self.descriptor_len()];
        let Some(region) = bbox.clamp_to(frame.width(), frame.height()) else {
            return hist;
        };

        let pixels = frame.as_ndarray();
        let (hb, sb) = (self.hue_bins as f64, self.sat_bins as f64);
        let mut count = 0usize;

        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                let (row, col) = (y as usize, x as usize);
                let r = pixels[[row, col, 0]] as f64 / 255.0;
                let g = pixels[[row, col, 1]] as f64 / 255.0;
                let b = pixels[[row, col, 2]] as f64 / 255.0;
                let (h, s, _v) = rgb_to_hsv(r, g, b);

                let h_bin = ((h / 360.0) * hb).min(hb - 1.0) as usize;
                let s_bin = (s * sb).min(sb - 1.0) as usize;
                hist[h_bin * self.sat_bins + s_bin] += 1.0;
                count += 1;
            }
        }

        if count > 0 {
            let total = count as f32;
            for v in &mut hist {
                *v /= total;
            }
        }
        hist
    }
}

/// RGB in `[0, 1]` to (hue degrees, saturation, value).
fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    (h, s, max)
}
