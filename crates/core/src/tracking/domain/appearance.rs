use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

/// Fixed-length appearance feature vector.
pub type Descriptor = Vec<f32>;

/// Weight of the newest observation when a track's descriptor is updated.
pub const DESCRIPTOR_BLEND_ALPHA: f32 = 0.5;

/// Domain interface for deriving an appearance descriptor from an image
/// region.
///
/// Implementations clamp the box to the frame and must return a vector of
/// exactly `descriptor_len()` entries, all zero when the clamped region is
/// empty.
pub trait AppearanceExtractor: Send {
    fn descriptor_len(&self) -> usize;

    fn extract(&self, frame: &Frame, bbox: &BoundingBox) -> Descriptor;
}

/// Bhattacharyya distance between two histograms, in `[0, 1]`.
///
/// Missing or massless descriptors carry no appearance information and
/// yield 0 so the pair is judged on overlap alone; a length mismatch is
/// maximally distant.
pub fn appearance_distance(a: Option<&[f32]>, b: Option<&[f32]>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    if a.len() != b.len() {
        return 1.0;
    }

    let sum_a: f64 = a.iter().map(|&v| v as f64).sum();
    let sum_b: f64 = b.iter().map(|&v| v as f64).sum();
    if sum_a <= f64::EPSILON || sum_b <= f64::EPSILON {
        return 0.0;
    }

    let coefficient: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| ((x as f64).max(0.0) * (y as f64).max(0.0)).sqrt())
        .sum::<f64>()
        / (sum_a * sum_b).sqrt();

    (1.0 - coefficient).max(0.0).sqrt()
}

/// Exponential update of a stored descriptor with a fresh observation.
///
/// Observations without mass (degenerate crops) leave the stored
/// descriptor untouched.
pub fn blend_descriptor(current: &mut Option<Descriptor>, observed: Option<&[f32]>, alpha: f32) {
    let Some(observed) = observed else {
        return;
    };
    if observed.iter().all(|&v| v == 0.0) {
        return;
    }
    match current {
        Some(stored) if stored.len() == observed.len() => {
            for (s, &o) in stored.iter_mut().zip(observed) {
                *s = (1.0 - alpha) * *s + alpha * o;
            }
        }
        _ => *current = Some(observed.to_vec()),
    }
}
