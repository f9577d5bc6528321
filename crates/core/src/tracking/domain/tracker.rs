use std::collections::BTreeMap;

use thiserror::Error;

use crate::shared::bbox::BoundingBox;
use crate::shared::constants::{
    TRACKER_APPEARANCE_THRESHOLD, TRACKER_IOU_THRESHOLD, TRACKER_MAX_MISSED,
};
use crate::tracking::domain::appearance::{
    appearance_distance, blend_descriptor, Descriptor, DESCRIPTOR_BLEND_ALPHA,
};
use crate::tracking::domain::assignment::{greedy_assign, Candidate};
use crate::tracking::domain::detection::Detection;

/// Active track IDs mapped to their current boxes, in ID order.
pub type TrackMap = BTreeMap<u32, BoundingBox>;

#[derive(Error, Debug, PartialEq)]
pub enum TrackerConfigError {
    #[error("iou threshold must be within [0, 1], got {0}")]
    IouThreshold(f64),
    #[error("appearance threshold must be within [0, 1], got {0}")]
    AppearanceThreshold(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Consecutive unmatched updates a track survives.
    pub max_missed: u32,
    pub iou_thresh: f64,
    pub appearance_thresh: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_missed: TRACKER_MAX_MISSED,
            iou_thresh: TRACKER_IOU_THRESHOLD,
            appearance_thresh: TRACKER_APPEARANCE_THRESHOLD,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TrackerConfigError> {
        if !(0.0..=1.0).contains(&self.iou_thresh) {
            return Err(TrackerConfigError::IouThreshold(self.iou_thresh));
        }
        if !(0.0..=1.0).contains(&self.appearance_thresh) {
            return Err(TrackerConfigError::AppearanceThreshold(
                self.appearance_thresh,
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Track {
    id: u32,
    bbox: BoundingBox,
    descriptor: Option<Descriptor>,
    missed: u32,
    age: u32,
}

/// Frame-by-frame identity tracker.
///
/// Tracks are matched to detections by IoU and appearance gates, live while
/// their consecutive miss count stays within `max_missed`, and are never
/// handed out directly: callers only see the `TrackMap` from `update`.
pub struct Tracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Consumes one processed frame's detections and returns every track
    /// still alive afterwards.
    pub fn update(&mut self, detections: &[Detection]) -> TrackMap {
        let matches = greedy_assign(self.candidates(detections));

        let mut matched_dets = vec![false; detections.len()];
        let mut matched_tracks = Vec::with_capacity(matches.len());
        for (track_id, di) in matches {
            matched_dets[di] = true;
            matched_tracks.push(track_id);
            if let Some(track) = self.tracks.iter_mut().find(|t| t.id == track_id) {
                apply_match(track, &detections[di]);
            }
        }

        self.age_unmatched(&matched_tracks);
        self.spawn_unmatched(detections, &matched_dets);

        self.track_map()
    }

    fn candidates(&self, detections: &[Detection]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for track in &self.tracks {
            for (di, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou < self.config.iou_thresh {
                    continue;
                }
                let distance =
                    appearance_distance(track.descriptor.as_deref(), det.descriptor.as_deref());
                if distance > self.config.appearance_thresh {
                    continue;
                }
                candidates.push(Candidate {
                    track_id: track.id,
                    detection: di,
                    iou,
                    distance,
                });
            }
        }
        candidates
    }

    fn age_unmatched(&mut self, matched: &[u32]) {
        for track in self.tracks.iter_mut() {
            if !matched.contains(&track.id) {
                track.missed += 1;
                track.age += 1;
            }
        }
        let max_missed = self.config.max_missed;
        self.tracks.retain(|t| {
            let alive = t.missed <= max_missed;
            if !alive {
                log::debug!("Retiring track {} after {} updates", t.id, t.age);
            }
            alive
        });
    }

    fn spawn_unmatched(&mut self, detections: &[Detection], matched: &[bool]) {
        for (det, _) in detections.iter().zip(matched).filter(|(_, &m)| !m) {
            self.tracks.push(Track {
                id: self.next_id,
                bbox: det.bbox,
                descriptor: det.descriptor.clone(),
                missed: 0,
                age: 1,
            });
            self.next_id += 1;
        }
    }

    #[cfg(test)]
    fn age_of(&self, id: u32) -> Option<u32> {
        self.tracks.iter().find(|t| t.id == id).map(|t| t.age)
    }

    fn track_map(&self) -> TrackMap {
        self.tracks.iter().map(|t| (t.id, t.bbox)).collect()
    }
}

fn apply_match(track: &mut Track, det: &Detection) {
    track.bbox = det.bbox;
    track.missed = 0;
    track.age += 1;
    blend_descriptor(
        &mut track.descriptor,
        det.descriptor.as_deref(),
        DESCRIPTOR_BLEND_ALPHA,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn det(x: i32, y: i32, w: i32, h: i32) -> Detection {
        Detection::without_descriptor(BoundingBox::new(x, y, w, h), 0.9)
    }

    fn det_with(x: i32, y: i32, descriptor: Vec<f32>) -> Detection {
        Detection::new(BoundingBox::new(x, y, 50, 50), 0.9, Some(descriptor))
    }

    fn tracker() -> Tracker {
        Tracker::new(TrackerConfig::default()).unwrap()
    }

    fn ids(map: &TrackMap) -> Vec<u32> {
        map.keys().copied().collect()
    }

    #[test]
    fn test_empty_update_on_fresh_tracker() {
        let mut t = tracker();
        assert!(t.update(&[]).is_empty());
        assert!(t.is_empty());
    }

    #[test]
    fn test_single_object_keeps_id_then_retires() {
        let mut t = tracker();

        let out = t.update(&[det(10, 10, 50, 50)]);
        assert_eq!(out, TrackMap::from([(1, BoundingBox::new(10, 10, 50, 50))]));

        let out = t.update(&[det(12, 11, 50, 50)]);
        assert_eq!(out, TrackMap::from([(1, BoundingBox::new(12, 11, 50, 50))]));

        // 30 misses keep the track alive with its last box.
        for frame in 3..=32 {
            let out = t.update(&[]);
            assert_eq!(
                out,
                TrackMap::from([(1, BoundingBox::new(12, 11, 50, 50))]),
                "frame {frame}"
            );
        }

        // The 31st miss crosses max_missed.
        assert!(t.update(&[]).is_empty());
        assert!(t.update(&[]).is_empty());
    }

    #[test]
    fn test_match_resets_missed_count() {
        let mut t = tracker();
        t.update(&[det(0, 0, 50, 50)]);

        for _ in 0..25 {
            t.update(&[]);
        }
        let out = t.update(&[det(1, 0, 50, 50)]);
        assert_eq!(ids(&out), vec![1]);

        // 50 misses in total, but never more than 25 in a row.
        for miss in 1..=25 {
            let out = t.update(&[]);
            assert_eq!(out, TrackMap::from([(1, BoundingBox::new(1, 0, 50, 50))]), "miss {miss}");
        }
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_age_counts_every_update_since_creation() {
        let mut t = tracker();
        t.update(&[det(0, 0, 50, 50)]);
        assert_eq!(t.age_of(1), Some(1));

        t.update(&[det(2, 0, 50, 50)]);
        t.update(&[]);
        t.update(&[]);
        assert_eq!(t.age_of(1), Some(4));

        t.update(&[det(0, 0, 50, 50), det(200, 200, 20, 20)]);
        assert_eq!(t.age_of(1), Some(5));
        assert_eq!(t.age_of(2), Some(1));
    }

    #[test]
    fn test_disjoint_detections_get_distinct_ids() {
        let mut t = tracker();
        let out = t.update(&[det(0, 0, 50, 50), det(200, 200, 50, 50)]);
        assert_eq!(ids(&out), vec![1, 2]);
        assert_eq!(out[&1], BoundingBox::new(0, 0, 50, 50));
        assert_eq!(out[&2], BoundingBox::new(200, 200, 50, 50));
    }

    #[test]
    fn test_disjoint_detections_order_independent() {
        let mut a = tracker();
        let mut b = tracker();
        let out_a = a.update(&[det(0, 0, 50, 50), det(200, 200, 50, 50)]);
        let out_b = b.update(&[det(200, 200, 50, 50), det(0, 0, 50, 50)]);

        let mut boxes_a: Vec<_> = out_a.values().copied().collect();
        let mut boxes_b: Vec<_> = out_b.values().copied().collect();
        boxes_a.sort_by_key(|b| (b.x, b.y));
        boxes_b.sort_by_key(|b| (b.x, b.y));
        assert_eq!(boxes_a, boxes_b);
        assert_eq!(out_a.len(), 2);
    }

    #[test]
    fn test_low_overlap_starts_new_track() {
        let mut t = tracker();
        t.update(&[det(0, 0, 50, 50)]);
        // IoU = 10*50 / (5000 - 500) ~= 0.11
        let out = t.update(&[det(40, 0, 50, 50)]);
        assert_eq!(ids(&out), vec![1, 2]);
        assert_eq!(out[&1], BoundingBox::new(0, 0, 50, 50));
    }

    #[test]
    fn test_appearance_gate_rejects_overlapping_but_different_object() {
        let mut t = tracker();
        t.update(&[det_with(10, 10, vec![1.0, 0.0, 0.0, 0.0])]);
        let out = t.update(&[det_with(11, 10, vec![0.0, 0.0, 0.0, 1.0])]);
        assert_eq!(ids(&out), vec![1, 2]);
    }

    #[test]
    fn test_similar_appearance_matches() {
        let mut t = tracker();
        t.update(&[det_with(10, 10, vec![0.5, 0.5, 0.0, 0.0])]);
        let out = t.update(&[det_with(12, 11, vec![0.45, 0.55, 0.0, 0.0])]);
        assert_eq!(ids(&out), vec![1]);
        assert_eq!(out[&1], BoundingBox::new(12, 11, 50, 50));
    }

    #[test]
    fn test_zero_descriptor_is_gated_by_iou_alone() {
        let mut t = tracker();
        t.update(&[det_with(10, 10, vec![1.0, 0.0, 0.0, 0.0])]);
        let out = t.update(&[det_with(12, 11, vec![0.0; 4])]);
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn test_contested_detection_goes_to_higher_iou_track() {
        let mut t = tracker();
        t.update(&[det(0, 0, 50, 50), det(30, 0, 50, 50)]);
        // Both gates pass; IoU with track 2 is 0.82, with track 1 0.33.
        let out = t.update(&[det(25, 0, 50, 50)]);
        assert_eq!(out[&2], BoundingBox::new(25, 0, 50, 50));
        assert_eq!(out[&1], BoundingBox::new(0, 0, 50, 50));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let config = TrackerConfig {
            max_missed: 0,
            ..TrackerConfig::default()
        };
        let mut t = Tracker::new(config).unwrap();
        let mut seen = Vec::new();
        for i in 0..5 {
            let out = t.update(&[det(i * 200, 0, 50, 50)]);
            seen.extend(out.keys().copied());
        }
        seen.dedup();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ids_strictly_increase_with_gaps_in_time() {
        let mut t = tracker();
        t.update(&[det(0, 0, 50, 50)]);
        t.update(&[det(0, 0, 50, 50), det(300, 300, 50, 50)]);
        let out = t.update(&[det(0, 0, 50, 50), det(300, 300, 50, 50), det(600, 0, 50, 50)]);
        assert_eq!(ids(&out), vec![1, 2, 3]);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let sequence: Vec<Vec<Detection>> = vec![
            vec![det(0, 0, 50, 50), det(40, 0, 50, 50)],
            vec![det(20, 0, 50, 50)],
            vec![],
            vec![det(22, 2, 50, 50), det(300, 300, 40, 40)],
            vec![det(0, 0, 50, 50), det(45, 0, 50, 50), det(302, 300, 40, 40)],
        ];

        let mut a = tracker();
        let mut b = tracker();
        for frame in &sequence {
            assert_eq!(a.update(frame), b.update(frame));
        }
    }

    #[test]
    fn test_unmatched_track_keeps_box() {
        let mut t = tracker();
        t.update(&[det(0, 0, 50, 50), det(300, 300, 50, 50)]);
        let out = t.update(&[det(2, 2, 50, 50)]);
        assert_eq!(out[&2], BoundingBox::new(300, 300, 50, 50));
        assert_eq!(t.len(), 2);
    }

    #[rstest]
    #[case::iou_negative(-0.1, 0.4)]
    #[case::iou_above_one(1.5, 0.4)]
    #[case::appearance_above_one(0.3, 1.01)]
    #[case::appearance_nan(0.3, f64::NAN)]
    fn test_invalid_config_rejected(#[case] iou_thresh: f64, #[case] appearance_thresh: f64) {
        let config = TrackerConfig {
            iou_thresh,
            appearance_thresh,
            ..TrackerConfig::default()
        };
        assert!(Tracker::new(config).is_err());
    }

    #[test]
    fn test_default_config_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_missed, 30);
        assert_eq!(config.iou_thresh, 0.3);
        assert_eq!(config.appearance_thresh, 0.4);
        assert!(config.validate().is_ok());
    }
}
