use serde::{Deserialize, Serialize};

use crate::shared::bbox::BoundingBox;

/// One persisted observation of a track on a processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub timestamp: String,
    pub track_id: u32,
    pub bbox: BoundingBox,
    /// Best overlapping detector confidence on that frame; 0 when the track
    /// was carried without a matching detection.
    pub confidence: f64,
}

impl DetectionRecord {
    pub fn new(timestamp: impl Into<String>, track_id: u32, bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            track_id,
            bbox,
            confidence,
        }
    }
}
