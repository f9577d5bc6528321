/// Deterministic greedy one-to-one assignment.
///
/// Candidate pairs that passed both gates are ranked by IoU (descending),
/// appearance distance (ascending), track ID (ascending) and detection index
/// (ascending), then accepted in that order while neither side is taken.
/// Identical candidate sets always produce identical assignments.
use std::cmp::Ordering;
use std::collections::HashSet;

/// One gated track/detection pairing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub track_id: u32,
    pub detection: usize,
    pub iou: f64,
    pub distance: f64,
}

impl Candidate {
    fn rank(&self, other: &Self) -> Ordering {
        other
            .iou
            .total_cmp(&self.iou)
            .then_with(|| self.distance.total_cmp(&other.distance))
            .then_with(|| self.track_id.cmp(&other.track_id))
            .then_with(|| self.detection.cmp(&other.detection))
    }
}

/// Resolves candidates into `(track_id, detection_index)` pairs, each track
/// and each detection used at most once.
pub fn greedy_assign(mut candidates: Vec<Candidate>) -> Vec<(u32, usize)> {
    candidates.sort_by(Candidate::rank);

    let mut used_tracks = HashSet::new();
    let mut used_dets = HashSet::new();
    let mut matches = Vec::new();

    for c in &candidates {
        if used_tracks.contains(&c.track_id) || used_dets.contains(&c.detection) {
            continue;
        }
        used_tracks.insert(c.track_id);
        used_dets.insert(c.detection);
        matches.push((c.track_id, c.detection));
    }
    matches
}
