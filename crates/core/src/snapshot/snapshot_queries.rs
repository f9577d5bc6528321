use std::sync::Arc;

use super::frame_renderer::{FrameRenderer, RenderError};
use super::snapshot_bridge::{SnapshotBridge, TrackSummary};

/// Read-only query surface over the snapshot bridge.
///
/// Cheap to clone; every clone reads the same bridge.
#[derive(Clone)]
pub struct SnapshotQueries {
    bridge: Arc<SnapshotBridge>,
    renderer: FrameRenderer,
}

impl SnapshotQueries {
    pub fn new(bridge: Arc<SnapshotBridge>, renderer: FrameRenderer) -> Self {
        Self { bridge, renderer }
    }

    /// Latest `{timestamp, count, tracks}`.
    pub fn latest(&self) -> TrackSummary {
        self.bridge.summary()
    }

    /// Latest frame as JPEG, with track boxes when `draw_boxes` is set.
    pub fn rendered_frame(&self, draw_boxes: bool) -> Result<Vec<u8>, RenderError> {
        let snapshot = self.bridge.current();
        self.renderer.render(&snapshot, draw_boxes)
    }

    pub fn bridge(&self) -> &Arc<SnapshotBridge> {
        &self.bridge
    }
}
