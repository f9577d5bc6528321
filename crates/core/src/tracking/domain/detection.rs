use crate::shared::bbox::BoundingBox;
use crate::tracking::domain::appearance::Descriptor;

/// One candidate object in one frame, ready for data association.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub descriptor: Option<Descriptor>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64, descriptor: Option<Descriptor>) -> Self {
        Self {
            bbox,
            confidence,
            descriptor,
        }
    }

    /// Detection judged on overlap alone.
    pub fn without_descriptor(bbox: BoundingBox, confidence: f64) -> Self {
        Self::new(bbox, confidence, None)
    }
}
