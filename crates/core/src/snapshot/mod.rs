pub mod broadcaster;
pub mod frame_renderer;
pub mod mjpeg_stream;
pub mod snapshot_bridge;
pub mod snapshot_queries;
