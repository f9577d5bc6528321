mod routes;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use livetrack_core::capture::infrastructure::ffmpeg_capture::FfmpegCapture;
use livetrack_core::detection::domain::target_class::resolve_target_class;
use livetrack_core::detection::infrastructure::coco_labels::COCO_LABELS;
use livetrack_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use livetrack_core::persistence::domain::detection_sink::{DetectionSink, NullDetectionSink};
use livetrack_core::persistence::infrastructure::json_lines_store::JsonLinesStore;
use livetrack_core::persistence::infrastructure::queued_detection_sink::QueuedDetectionSink;
use livetrack_core::pipeline::acquisition_loop::{AcquisitionConfig, AcquisitionLoop};
use livetrack_core::pipeline::pipeline_logger::PeriodicPipelineLogger;
use livetrack_core::shared::constants::{
    DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_CONFIDENCE, DEFAULT_FRAMES_PER_UPDATE,
    DEFAULT_JPEG_QUALITY, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_DETECTIONS, DEFAULT_MODEL_NAME,
    DEFAULT_RECORD_QUEUE, DEFAULT_SOURCE, DEFAULT_STREAM_FPS, DEFAULT_TARGET_CLASS,
    TRACKER_APPEARANCE_THRESHOLD, TRACKER_IOU_THRESHOLD, TRACKER_MAX_MISSED,
};
use livetrack_core::shared::model_resolver;
use livetrack_core::snapshot::broadcaster::Broadcaster;
use livetrack_core::snapshot::frame_renderer::FrameRenderer;
use livetrack_core::snapshot::snapshot_bridge::SnapshotBridge;
use livetrack_core::snapshot::snapshot_queries::SnapshotQueries;
use livetrack_core::tracking::domain::tracker::{Tracker, TrackerConfig};
use livetrack_core::tracking::infrastructure::hsv_histogram_extractor::HsvHistogramExtractor;

use routes::AppState;

/// Live object tracking over a camera or stream, served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "livetrack")]
struct Cli {
    /// Capture device, file or stream URL.
    #[arg(long, default_value = DEFAULT_SOURCE)]
    source: String,

    /// ffmpeg input device for --source (e.g. video4linux2, avfoundation, dshow).
    #[arg(long)]
    input_format: Option<String>,

    /// YOLO ONNX model (defaults to the cached yolov8n.onnx).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Object class to track.
    #[arg(long, default_value = DEFAULT_TARGET_CLASS)]
    target_class: String,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Upper bound on detections kept per frame.
    #[arg(long, default_value_t = DEFAULT_MAX_DETECTIONS)]
    max_detections: usize,

    /// Run detection every Nth frame (1 = every frame).
    #[arg(long, default_value_t = DEFAULT_FRAMES_PER_UPDATE)]
    frames_per_update: usize,

    /// Also publish frames between detections, with the last known tracks.
    #[arg(long)]
    publish_skipped_frames: bool,

    /// Consecutive missed updates before a track is dropped.
    #[arg(long, default_value_t = TRACKER_MAX_MISSED)]
    max_missed: u32,

    /// Minimum IoU for a detection to continue a track (0.0-1.0).
    #[arg(long, default_value_t = TRACKER_IOU_THRESHOLD)]
    iou_thresh: f64,

    /// Maximum appearance distance for a match (0.0-1.0).
    #[arg(long, default_value_t = TRACKER_APPEARANCE_THRESHOLD)]
    appearance_thresh: f64,

    /// Address the HTTP server binds to.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Milliseconds between WebSocket pushes.
    #[arg(long, default_value_t = DEFAULT_BROADCAST_INTERVAL_MS)]
    broadcast_interval_ms: u64,

    /// Frame rate of the MJPEG stream.
    #[arg(long, default_value_t = DEFAULT_STREAM_FPS)]
    stream_fps: u32,

    /// JPEG quality for /frame and /stream (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    jpeg_quality: u8,

    /// Append detection records to this JSON-lines file.
    #[arg(long)]
    records: Option<PathBuf>,

    /// Records buffered for the writer before new ones are dropped.
    #[arg(long, default_value_t = DEFAULT_RECORD_QUEUE)]
    record_queue: usize,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let listen = validate(&cli)?;

    let bridge = Arc::new(SnapshotBridge::new());
    let acquisition = build_acquisition(&cli, Arc::clone(&bridge))?;
    // The loop logs its own failures and leaves the last snapshot in place.
    acquisition.spawn()?;

    let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&bridge)));
    let _broadcast = Arc::clone(&broadcaster)
        .spawn(Duration::from_millis(cli.broadcast_interval_ms))?;

    let state = AppState {
        queries: SnapshotQueries::new(bridge, FrameRenderer::new(cli.jpeg_quality)),
        broadcaster,
        stream_fps: cli.stream_fps,
    };

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Serving on http://{listen}");
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}

fn build_acquisition(
    cli: &Cli,
    bridge: Arc<SnapshotBridge>,
) -> Result<AcquisitionLoop, Box<dyn std::error::Error>> {
    let tracker = Tracker::new(TrackerConfig {
        max_missed: cli.max_missed,
        iou_thresh: cli.iou_thresh,
        appearance_thresh: cli.appearance_thresh,
    })?;

    let target = resolve_target_class(&COCO_LABELS, &cli.target_class)?;
    let model_path = model_resolver::resolve(
        DEFAULT_MODEL_NAME,
        cli.model.as_deref(),
        Some(Path::new("models")),
    )?;
    let detector = OnnxYoloDetector::new(&model_path, target, cli.confidence, cli.max_detections)?;

    let sink: Box<dyn DetectionSink> = match &cli.records {
        Some(path) => {
            let store = JsonLinesStore::open(path)?;
            log::info!("Recording detections to {}", path.display());
            Box::new(QueuedDetectionSink::spawn(Box::new(store), cli.record_queue)?)
        }
        None => Box::new(NullDetectionSink),
    };

    let config = AcquisitionConfig {
        frames_per_update: cli.frames_per_update,
        publish_skipped_frames: cli.publish_skipped_frames,
        ..AcquisitionConfig::default()
    };

    Ok(AcquisitionLoop::new(
        Box::new(FfmpegCapture::new(cli.source.clone(), cli.input_format.clone())),
        Box::new(detector),
        Box::new(HsvHistogramExtractor::default()),
        tracker,
        bridge,
        config,
    )
    .with_sink(sink)
    .with_logger(Box::new(PeriodicPipelineLogger::default())))
}

/// Check flag ranges; returns the parsed listen address.
fn validate(cli: &Cli) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.iou_thresh) {
        return Err(format!(
            "IoU threshold must be between 0.0 and 1.0, got {}",
            cli.iou_thresh
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.appearance_thresh) {
        return Err(format!(
            "Appearance threshold must be between 0.0 and 1.0, got {}",
            cli.appearance_thresh
        )
        .into());
    }
    if cli.frames_per_update == 0 {
        return Err("Frames per update must be at least 1".into());
    }
    if cli.max_detections == 0 {
        return Err("Max detections must be at least 1".into());
    }
    if cli.stream_fps == 0 {
        return Err("Stream FPS must be at least 1".into());
    }
    if cli.broadcast_interval_ms == 0 {
        return Err("Broadcast interval must be at least 1 ms".into());
    }
    if !(1..=100).contains(&cli.jpeg_quality) {
        return Err(format!(
            "JPEG quality must be between 1 and 100, got {}",
            cli.jpeg_quality
        )
        .into());
    }
    if cli.records.is_some() && cli.record_queue == 0 {
        return Err("Record queue must hold at least one record".into());
    }
    cli.listen
        .parse()
        .map_err(|e| format!("Invalid listen address {:?}: {e}", cli.listen).into())
}
