use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;

use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::object_detector::{ObjectDetector, RawDetection};
use crate::persistence::domain::detection_record::DetectionRecord;
use crate::persistence::domain::detection_sink::{DetectionSink, NullDetectionSink};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::constants::{DEFAULT_FRAMES_PER_UPDATE, RECORD_CONFIDENCE_IOU, TIMESTAMP_FORMAT};
use crate::snapshot::snapshot_bridge::SnapshotBridge;
use crate::tracking::domain::appearance::AppearanceExtractor;
use crate::tracking::domain::detection::Detection;
use crate::tracking::domain::tracker::{TrackMap, Tracker};

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("failed to open frame source: {0}")]
    Open(String),
    #[error("failed to start acquisition thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionConfig {
    /// Detect and track on every Nth captured frame.
    pub frames_per_update: usize,
    /// Publish in-between frames with the last track mapping.
    pub publish_skipped_frames: bool,
    /// Pause after a failed read.
    pub retry_delay: Duration,
    /// Pause after every iteration.
    pub idle_delay: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frames_per_update: DEFAULT_FRAMES_PER_UPDATE,
            publish_skipped_frames: false,
            retry_delay: Duration::from_millis(100),
            idle_delay: Duration::from_millis(10),
        }
    }
}

/// What one iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Detection and tracking ran; the result was published.
    Processed { tracks: usize },
    /// Frame fell between detection frames.
    Skipped { published: bool },
    /// The read failed; nothing changed.
    ReadFailed,
    EndOfStream,
}

/// The single producer: capture → detect → describe → track → publish.
///
/// Owns the tracker outright; everything else observes results through the
/// snapshot bridge.
pub struct AcquisitionLoop {
    source: Box<dyn FrameSource>,
    detector: Box<dyn ObjectDetector>,
    extractor: Box<dyn AppearanceExtractor>,
    tracker: Tracker,
    bridge: Arc<SnapshotBridge>,
    sink: Box<dyn DetectionSink>,
    logger: Box<dyn PipelineLogger>,
    config: AcquisitionConfig,
    frame_count: u64,
    last_tracks: TrackMap,
}

impl AcquisitionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn ObjectDetector>,
        extractor: Box<dyn AppearanceExtractor>,
        tracker: Tracker,
        bridge: Arc<SnapshotBridge>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            source,
            detector,
            extractor,
            tracker,
            bridge,
            sink: Box::new(NullDetectionSink),
            logger: Box::new(NullPipelineLogger),
            config: AcquisitionConfig {
                frames_per_update: config.frames_per_update.max(1),
                ..config
            },
            frame_count: 0,
            last_tracks: TrackMap::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn DetectionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Run the loop on a dedicated thread named `acquisition`.
    pub fn spawn(self) -> Result<JoinHandle<Result<(), AcquisitionError>>, AcquisitionError> {
        let handle = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Open the source and iterate until it reports end of stream.
    ///
    /// An unopenable source ends the loop before anything is published;
    /// readers keep seeing the placeholder snapshot.
    pub fn run(mut self) -> Result<(), AcquisitionError> {
        let info = self.source.open().map_err(|e| {
            log::error!("Could not open frame source: {e}");
            AcquisitionError::Open(e.to_string())
        })?;
        log::info!(
            "Capturing from {} ({}x{}, {:.1} fps, {})",
            info.source,
            info.width,
            info.height,
            info.fps,
            info.codec
        );

        loop {
            match self.step() {
                StepOutcome::EndOfStream => {
                    log::info!("Frame source ended after {} frames", self.frame_count);
                    return Ok(());
                }
                StepOutcome::ReadFailed => {
                    sleep(self.config.retry_delay);
                    continue;
                }
                StepOutcome::Processed { .. } | StepOutcome::Skipped { .. } => {}
            }
            sleep(self.config.idle_delay);
        }
    }

    /// One iteration: read a frame and, on detection frames, update the
    /// tracker and publish.
    pub fn step(&mut self) -> StepOutcome {
        let t0 = Instant::now();
        let frame = match self.source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => return StepOutcome::EndOfStream,
            Err(e) => {
                log::warn!("Frame read failed, retrying: {e}");
                return StepOutcome::ReadFailed;
            }
        };
        self.frame_count += 1;

        if self.frame_count % self.config.frames_per_update as u64 != 0 {
            if self.config.publish_skipped_frames {
                self.bridge
                    .publish(&frame, &self.last_tracks, self.last_tracks.len());
            }
            return StepOutcome::Skipped {
                published: self.config.publish_skipped_frames,
            };
        }
        self.logger.timing("capture", elapsed_ms(t0));

        let t = Instant::now();
        let raw = self.detector.detect(&frame).unwrap_or_else(|e| {
            log::warn!("Detection failed on frame {}: {e}", frame.index());
            Vec::new()
        });
        self.logger.timing("detect", elapsed_ms(t));

        let t = Instant::now();
        let detections: Vec<Detection> = raw
            .iter()
            .map(|d| {
                let descriptor = self.extractor.extract(&frame, &d.bbox);
                Detection::new(d.bbox, d.confidence, Some(descriptor))
            })
            .collect();
        self.logger.timing("describe", elapsed_ms(t));

        let t = Instant::now();
        let tracks = self.tracker.update(&detections);
        self.logger.timing("track", elapsed_ms(t));

        self.persist(&tracks, &raw);

        let t = Instant::now();
        self.bridge.publish(&frame, &tracks, tracks.len());
        self.logger.timing("publish", elapsed_ms(t));

        let count = tracks.len();
        self.logger.metric("tracks", count as f64);
        self.logger.frame_done();
        self.last_tracks = tracks;

        StepOutcome::Processed { tracks: count }
    }

    fn persist(&self, tracks: &TrackMap, raw: &[RawDetection]) {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        for (&id, bbox) in tracks {
            self.sink.record(DetectionRecord::new(
                timestamp.clone(),
                id,
                *bbox,
                record_confidence(bbox, raw),
            ));
        }
    }
}

/// Highest confidence among detections overlapping `bbox` enough to be
/// attributed to it, else 0.
fn record_confidence(bbox: &crate::shared::bbox::BoundingBox, raw: &[RawDetection]) -> f64 {
    raw.iter()
        .filter(|d| d.bbox.iou(bbox) > RECORD_CONFIDENCE_IOU)
        .map(|d| d.confidence)
        .fold(0.0, f64::max)
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::frame_source::SourceInfo;
    use crate::shared::bbox::BoundingBox;
    use crate::shared::frame::Frame;
    use crate::tracking::domain::tracker::TrackerConfig;
    use crate::tracking::infrastructure::hsv_histogram_extractor::HsvHistogramExtractor;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Script<T> = VecDeque<Result<T, String>>;

    /// Plays back a fixed list of reads, then reports end of stream.
    struct ScriptedSource {
        reads: Script<Frame>,
        open_error: Option<String>,
    }

    impl ScriptedSource {
        fn frames(n: usize) -> Self {
            Self {
                reads: (0..n)
                    .map(|i| Ok(Frame::from_rgb(vec![0; 100 * 100 * 3], 100, 100, i as u64).unwrap()))
                    .collect(),
                open_error: None,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
            if let Some(e) = &self.open_error {
                return Err(e.clone().into());
            }
            Ok(SourceInfo {
                width: 100,
                height: 100,
                fps: 30.0,
                codec: "raw".into(),
                source: "scripted".into(),
            })
        }

        fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            match self.reads.pop_front() {
                Some(Ok(frame)) => Ok(Some(frame)),
                Some(Err(e)) => Err(e.into()),
                None => Ok(None),
            }
        }
    }

    /// Returns scripted detections per call, then nothing.
    struct FakeDetector {
        script: Script<Vec<RawDetection>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeDetector {
        fn new(script: Vec<Result<Vec<RawDetection>, String>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script: script.into(),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl ObjectDetector for FakeDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(Ok(dets)) => Ok(dets),
                Some(Err(e)) => Err(e.into()),
                None => Ok(Vec::new()),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<DetectionRecord>>>);

    impl DetectionSink for RecordingSink {
        fn record(&self, record: DetectionRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    fn raw(x: i32, y: i32, w: i32, h: i32, confidence: f64) -> RawDetection {
        RawDetection {
            bbox: BoundingBox::new(x, y, w, h),
            confidence,
        }
    }

    fn config(frames_per_update: usize) -> AcquisitionConfig {
        AcquisitionConfig {
            frames_per_update,
            publish_skipped_frames: false,
            retry_delay: Duration::ZERO,
            idle_delay: Duration::ZERO,
        }
    }

    fn build(
        source: ScriptedSource,
        detector: FakeDetector,
        config: AcquisitionConfig,
    ) -> (AcquisitionLoop, Arc<SnapshotBridge>) {
        let bridge = Arc::new(SnapshotBridge::new());
        let lp = AcquisitionLoop::new(
            Box::new(source),
            Box::new(detector),
            Box::new(HsvHistogramExtractor::default()),
            Tracker::new(TrackerConfig::default()).unwrap(),
            Arc::clone(&bridge),
            config,
        );
        (lp, bridge)
    }

    #[test]
    fn test_single_object_lifecycle() {
        let mut script = vec![
            Ok(vec![raw(10, 10, 50, 50, 0.9)]),
            Ok(vec![raw(12, 11, 50, 50, 0.8)]),
        ];
        script.extend((0..31).map(|_| Ok(Vec::new())));
        let (detector, _) = FakeDetector::new(script);
        let (mut lp, bridge) = build(ScriptedSource::frames(33), detector, config(1));

        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 });
        assert_eq!(
            bridge.read().tracks,
            TrackMap::from([(1, BoundingBox::new(10, 10, 50, 50))])
        );

        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 });
        assert_eq!(
            bridge.read().tracks,
            TrackMap::from([(1, BoundingBox::new(12, 11, 50, 50))])
        );

        for frame in 3..=32 {
            assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 }, "frame {frame}");
        }
        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 0 });
        assert!(bridge.read().tracks.is_empty());
        assert_eq!(lp.step(), StepOutcome::EndOfStream);
    }

    #[test]
    fn test_two_disjoint_objects_get_two_ids() {
        let (detector, _) = FakeDetector::new(vec![Ok(vec![
            raw(0, 0, 20, 20, 0.9),
            raw(60, 60, 20, 20, 0.7),
        ])]);
        let (mut lp, bridge) = build(ScriptedSource::frames(1), detector, config(1));

        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 2 });
        let snap = bridge.read();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.tracks.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_detection_runs_every_nth_frame() {
        let (detector, calls) = FakeDetector::new(vec![Ok(vec![raw(0, 0, 20, 20, 0.9)])]);
        let (mut lp, bridge) = build(ScriptedSource::frames(4), detector, config(2));

        assert_eq!(lp.step(), StepOutcome::Skipped { published: false });
        assert_eq!(bridge.read().sequence, 0);
        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 });
        assert_eq!(lp.step(), StepOutcome::Skipped { published: false });
        assert_eq!(bridge.read().sequence, 1);
        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.read().sequence, 2);
    }

    #[test]
    fn test_skipped_frames_published_with_last_tracks_when_enabled() {
        let (detector, calls) = FakeDetector::new(vec![Ok(vec![raw(0, 0, 20, 20, 0.9)])]);
        let cfg = AcquisitionConfig {
            publish_skipped_frames: true,
            ..config(2)
        };
        let (mut lp, bridge) = build(ScriptedSource::frames(3), detector, cfg);

        assert_eq!(lp.step(), StepOutcome::Skipped { published: true });
        assert!(bridge.read().tracks.is_empty());
        lp.step();
        assert_eq!(lp.step(), StepOutcome::Skipped { published: true });

        let snap = bridge.read();
        assert_eq!(snap.sequence, 3);
        assert_eq!(snap.tracks.len(), 1);
        assert_eq!(snap.frame.index(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detector_error_counts_as_empty_frame() {
        let (detector, _) = FakeDetector::new(vec![
            Ok(vec![raw(10, 10, 30, 30, 0.9)]),
            Err("inference failed".into()),
            Ok(vec![raw(11, 10, 30, 30, 0.9)]),
        ]);
        let (mut lp, bridge) = build(ScriptedSource::frames(3), detector, config(1));

        lp.step();
        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 });
        assert_eq!(bridge.read().tracks[&1], BoundingBox::new(10, 10, 30, 30));
        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 });
        assert_eq!(bridge.read().tracks[&1], BoundingBox::new(11, 10, 30, 30));
    }

    #[test]
    fn test_read_failure_changes_nothing() {
        let mut source = ScriptedSource::frames(1);
        source.reads.push_front(Err("device busy".into()));
        let (detector, calls) = FakeDetector::new(vec![Ok(vec![raw(0, 0, 20, 20, 0.9)])]);
        let (mut lp, bridge) = build(source, detector, config(1));

        assert_eq!(lp.step(), StepOutcome::ReadFailed);
        assert_eq!(bridge.read().sequence, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(lp.step(), StepOutcome::Processed { tracks: 1 });
        assert_eq!(bridge.read().frame.index(), 0);
    }

    #[test]
    fn test_records_carry_overlapping_confidence() {
        let (detector, _) = FakeDetector::new(vec![
            Ok(vec![raw(0, 0, 20, 20, 0.9), raw(60, 60, 20, 20, 0.6)]),
            Ok(vec![raw(1, 0, 20, 20, 0.7)]),
        ]);
        let sink = RecordingSink::default();
        let (lp, _) = build(ScriptedSource::frames(2), detector, config(1));
        let mut lp = lp.with_sink(Box::new(sink.clone()));

        lp.step();
        lp.step();

        let records = sink.0.lock().unwrap();
        let summary: Vec<(u32, f64)> = records.iter().map(|r| (r.track_id, r.confidence)).collect();
        assert_eq!(summary, vec![(1, 0.9), (2, 0.6), (1, 0.7), (2, 0.0)]);
        assert_eq!(records[2].bbox, BoundingBox::new(1, 0, 20, 20));
    }

    #[test]
    fn test_run_stops_at_end_of_stream() {
        let (detector, calls) = FakeDetector::new(Vec::new());
        let (lp, bridge) = build(ScriptedSource::frames(6), detector, config(2));

        lp.run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(bridge.read().sequence, 3);
    }

    #[test]
    fn test_run_retries_failed_reads() {
        let mut source = ScriptedSource::frames(2);
        source.reads.insert(1, Err("glitch".into()));
        let (detector, _) = FakeDetector::new(Vec::new());
        let (lp, bridge) = build(source, detector, config(1));

        lp.run().unwrap();
        assert_eq!(bridge.read().sequence, 2);
    }

    #[test]
    fn test_unopenable_source_publishes_nothing() {
        let mut source = ScriptedSource::frames(3);
        source.open_error = Some("no camera".into());
        let (detector, calls) = FakeDetector::new(Vec::new());
        let (lp, bridge) = build(source, detector, config(1));

        let err = lp.run().unwrap_err();
        assert!(matches!(err, AcquisitionError::Open(ref m) if m == "no camera"));
        assert_eq!(bridge.read().sequence, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_spawned_loop_runs_on_named_thread() {
        struct ThreadNameDetector(Arc<Mutex<Option<String>>>);

        impl ObjectDetector for ThreadNameDetector {
            fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
                *self.0.lock().unwrap() = std::thread::current().name().map(str::to_string);
                Ok(vec![raw(5, 5, 10, 10, 0.5)])
            }
        }

        let name = Arc::new(Mutex::new(None));
        let bridge = Arc::new(SnapshotBridge::new());
        let lp = AcquisitionLoop::new(
            Box::new(ScriptedSource::frames(2)),
            Box::new(ThreadNameDetector(Arc::clone(&name))),
            Box::new(HsvHistogramExtractor::default()),
            Tracker::new(TrackerConfig::default()).unwrap(),
            Arc::clone(&bridge),
            config(1),
        );

        lp.spawn().unwrap().join().unwrap().unwrap();
        assert_eq!(name.lock().unwrap().as_deref(), Some("acquisition"));
        assert_eq!(bridge.read().count, 1);
    }

    #[test]
    fn test_zero_frames_per_update_treated_as_one() {
        let (detector, calls) = FakeDetector::new(Vec::new());
        let (mut lp, _) = build(ScriptedSource::frames(2), detector, config(0));
        lp.step();
        lp.step();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
