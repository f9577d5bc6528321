pub mod json_lines_store;
pub mod queued_detection_sink;
