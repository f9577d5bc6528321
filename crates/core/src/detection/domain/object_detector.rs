use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

/// A candidate object returned by a detector, before tracking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f64,
}

/// Domain interface for single-class object detection.
///
/// The target class is fixed when the detector is built; `detect` only
/// returns boxes of that class. Implementations may hold inference
/// sessions with internal scratch state, hence `&mut self`.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>>;
}
