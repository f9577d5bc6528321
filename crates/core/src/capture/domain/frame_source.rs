use crate::shared::frame::Frame;

/// Properties of an opened capture source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Nominal rate; 0 when the source does not report one.
    pub fps: f64,
    pub codec: String,
    pub source: String,
}

/// Pull-based source of RGB frames (camera, network stream, or file).
///
/// The source location is fixed at construction; `open` acquires it.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>>;

    /// Next decoded frame. `Ok(None)` marks the end of the stream; an
    /// error is a failed read that may succeed on retry.
    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;
}
