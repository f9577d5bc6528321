use super::detection_record::DetectionRecord;

/// Blocking storage backend, driven by a single writer.
pub trait DetectionStore: Send {
    fn append(&mut self, record: &DetectionRecord) -> Result<(), Box<dyn std::error::Error>>;

    /// Push buffered records to durable storage. Default: no-op.
    fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
