/// Model file searched for in the user cache when no path is given.
pub const DEFAULT_MODEL_NAME: &str = "yolov8n.onnx";

/// Capture device opened when no source is given.
pub const DEFAULT_SOURCE: &str = "/dev/video0";

/// Label the detector is restricted to, plus accepted spellings.
pub const DEFAULT_TARGET_CLASS: &str = "cell phone";
pub const TARGET_CLASS_ALIASES: &[&str] = &["cell phone", "cellphone", "phone"];

pub const DEFAULT_CONFIDENCE: f64 = 0.35;
pub const DEFAULT_MAX_DETECTIONS: usize = 50;

/// Run detection and tracking on every Nth captured frame.
pub const DEFAULT_FRAMES_PER_UPDATE: usize = 2;

/// Consecutive misses before a track is retired (~1 second at 30 fps).
pub const TRACKER_MAX_MISSED: u32 = 30;
pub const TRACKER_IOU_THRESHOLD: f64 = 0.3;
pub const TRACKER_APPEARANCE_THRESHOLD: f64 = 0.4;

/// Minimum IoU between a track box and a detection to attribute the
/// detection's confidence to the persisted record.
pub const RECORD_CONFIDENCE_IOU: f64 = 0.4;

pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_STREAM_FPS: u32 = 15;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_RECORD_QUEUE: usize = 1024;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Size of the placeholder frame served before the first publish.
pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;

/// Timestamp layout used in every outward payload.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
