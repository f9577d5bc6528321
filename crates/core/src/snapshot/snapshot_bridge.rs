use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::shared::constants::{PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH, TIMESTAMP_FORMAT};
use crate::shared::frame::Frame;
use crate::tracking::domain::tracker::TrackMap;

/// Everything the producer published in one go.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub frame: Frame,
    pub tracks: TrackMap,
    pub count: usize,
    pub timestamp: DateTime<Local>,
    /// Number of publishes that preceded this snapshot; 0 for the
    /// placeholder.
    pub sequence: u64,
}

impl Snapshot {
    /// White frame, no tracks. Served until the first publish.
    pub fn placeholder() -> Self {
        Self {
            frame: Frame::blank(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, 255),
            tracks: TrackMap::new(),
            count: 0,
            timestamp: Local::now(),
            sequence: 0,
        }
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            timestamp: self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            count: self.count,
            tracks: self.tracks.clone(),
        }
    }
}

/// The `{timestamp, count, tracks}` payload shared by queries and pushes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub timestamp: String,
    pub count: usize,
    pub tracks: TrackMap,
}

/// Single-producer, many-reader cell holding the latest snapshot.
///
/// The lock guards only a pointer swap: `publish` builds the new snapshot
/// before taking it and `read` copies out after releasing it, so neither
/// side waits on image copies, encoding, or I/O done by the other.
pub struct SnapshotBridge {
    current: Mutex<Arc<Snapshot>>,
}

impl SnapshotBridge {
    pub fn new() -> Self {
        Self::with_initial(Snapshot::placeholder())
    }

    pub fn with_initial(snapshot: Snapshot) -> Self {
        Self {
            current: Mutex::new(Arc::new(snapshot)),
        }
    }

    /// Replace the held snapshot with copies of the given state.
    pub fn publish(&self, frame: &Frame, tracks: &TrackMap, count: usize) {
        let mut next = Snapshot {
            frame: frame.clone(),
            tracks: tracks.clone(),
            count,
            timestamp: Local::now(),
            sequence: 0,
        };
        let mut slot = self.lock();
        next.sequence = slot.sequence + 1;
        *slot = Arc::new(next);
    }

    /// Independent copy of the latest snapshot.
    pub fn read(&self) -> Snapshot {
        Snapshot::clone(&self.current())
    }

    /// Shared handle to the latest snapshot, for readers that only look.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.lock())
    }

    /// Latest payload without copying the frame.
    pub fn summary(&self) -> TrackSummary {
        self.current().summary()
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Snapshot>> {
        // The slot only ever holds a complete snapshot, so a panic elsewhere
        // cannot leave it half-written.
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SnapshotBridge {
    fn default() -> Self {
        Self::new()
    }
}
