use super::detection_record::DetectionRecord;

/// Fire-and-forget destination for detection records.
///
/// `record` never blocks the caller and never reports failure; records may
/// be lost (at-most-once).
pub trait DetectionSink: Send {
    fn record(&self, record: DetectionRecord);
}

/// Sink used when persistence is disabled.
pub struct NullDetectionSink;

impl DetectionSink for NullDetectionSink {
    fn record(&self, _record: DetectionRecord) {}
}
