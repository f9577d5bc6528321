use super::frame_renderer::RenderError;
use super::snapshot_queries::SnapshotQueries;

/// Multipart boundary token shared with the `Content-Type` header.
pub const MJPEG_BOUNDARY: &str = "frame";

pub fn mjpeg_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}")
}

/// Infinite, pull-driven sequence of MJPEG parts.
///
/// Each `next()` reads a fresh snapshot and encodes it; nothing is cached
/// between pulls, so dropping and recreating the iterator restarts the
/// feed at the current frame. Pacing is the consumer's job.
pub struct MjpegFrames {
    queries: SnapshotQueries,
    draw_boxes: bool,
}

impl MjpegFrames {
    pub fn new(queries: SnapshotQueries, draw_boxes: bool) -> Self {
        Self {
            queries,
            draw_boxes,
        }
    }
}

impl Iterator for MjpegFrames {
    type Item = Result<Vec<u8>, RenderError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(
            self.queries
                .rendered_frame(self.draw_boxes)
                .map(|jpeg| multipart_chunk(&jpeg)),
        )
    }
}

/// Wrap one JPEG as a multipart part.
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bbox::BoundingBox;
    use crate::shared::frame::Frame;
    use crate::snapshot::frame_renderer::FrameRenderer;
    use crate::snapshot::snapshot_bridge::SnapshotBridge;
    use crate::tracking::domain::tracker::TrackMap;
    use std::sync::Arc;

    fn frames() -> (Arc<SnapshotBridge>, MjpegFrames) {
        let bridge = Arc::new(SnapshotBridge::new());
        let queries = SnapshotQueries::new(Arc::clone(&bridge), FrameRenderer::new(70));
        (bridge, MjpegFrames::new(queries, true))
    }

    fn jpeg_of(chunk: &[u8]) -> &[u8] {
        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(chunk.starts_with(header));
        assert!(chunk.ends_with(b"\r\n"));
        &chunk[header.len()..chunk.len() - 2]
    }

    #[test]
    fn test_chunk_framing() {
        let chunk = multipart_chunk(&[1, 2, 3]);
        assert_eq!(jpeg_of(&chunk), &[1, 2, 3]);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(
            mjpeg_content_type(),
            "multipart/x-mixed-replace; boundary=frame"
        );
    }

    #[test]
    fn test_never_ends() {
        let (_bridge, mut stream) = frames();
        for _ in 0..5 {
            assert!(stream.next().unwrap().is_ok());
        }
    }

    #[test]
    fn test_each_pull_sees_latest_publish() {
        let (bridge, mut stream) = frames();
        let first = stream.next().unwrap().unwrap();
        let img = image::load_from_memory(jpeg_of(&first)).unwrap();
        assert_eq!(img.width(), 640);

        bridge.publish(
            &Frame::blank(64, 48, 0),
            &TrackMap::from([(1, BoundingBox::new(4, 4, 10, 10))]),
            1,
        );
        let second = stream.next().unwrap().unwrap();
        let img = image::load_from_memory(jpeg_of(&second)).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }
}
