use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{stream, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use livetrack_core::snapshot::broadcaster::{Broadcaster, DeliveryError, Subscriber};
use livetrack_core::snapshot::mjpeg_stream::{mjpeg_content_type, MjpegFrames};
use livetrack_core::snapshot::snapshot_bridge::TrackSummary;
use livetrack_core::snapshot::snapshot_queries::SnapshotQueries;

/// Summaries buffered per WebSocket client before it counts as lagging.
const WS_QUEUE: usize = 8;

#[derive(Clone)]
pub struct AppState {
    pub queries: SnapshotQueries,
    pub broadcaster: Arc<Broadcaster>,
    pub stream_fps: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/latest", get(latest))
        .route("/frame", get(frame))
        .route("/stream", get(mjpeg))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn status_payload() -> Value {
    json!({ "status": "Object tracking API running" })
}

async fn status() -> Json<Value> {
    Json(status_payload())
}

async fn latest(State(state): State<AppState>) -> Json<TrackSummary> {
    Json(state.queries.latest())
}

#[derive(Debug, Deserialize)]
pub struct FrameParams {
    #[serde(default = "default_boxes")]
    pub boxes: bool,
}

fn default_boxes() -> bool {
    true
}

async fn frame(State(state): State<AppState>, Query(params): Query<FrameParams>) -> Response {
    let queries = state.queries.clone();
    match tokio::task::spawn_blocking(move || queries.rendered_frame(params.boxes)).await {
        Ok(Ok(jpeg)) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Ok(Err(e)) => {
            log::warn!("Frame render failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Interval between MJPEG parts; a zero rate is treated as 1 fps.
pub fn frame_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

async fn mjpeg(State(state): State<AppState>) -> Response {
    let mut ticker = tokio::time::interval(frame_period(state.stream_fps));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let frames = MjpegFrames::new(state.queries.clone(), true);

    let parts = stream::unfold((frames, ticker), |(mut frames, mut ticker)| async move {
        ticker.tick().await;
        let (frames, part) = tokio::task::spawn_blocking(move || {
            let part = frames.next();
            (frames, part)
        })
        .await
        .ok()?;
        match part? {
            Ok(chunk) => Some((Ok::<_, Infallible>(chunk), (frames, ticker))),
            Err(e) => {
                log::warn!("Ending MJPEG stream: {e}");
                None
            }
        }
    });

    (
        [(header::CONTENT_TYPE, mjpeg_content_type())],
        Body::from_stream(parts),
    )
        .into_response()
}

/// Broadcaster endpoint for one WebSocket connection.
struct WsSubscriber(mpsc::Sender<TrackSummary>);

impl Subscriber for WsSubscriber {
    fn deliver(&self, summary: &TrackSummary) -> Result<(), DeliveryError> {
        self.0.try_send(summary.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<TrackSummary>(WS_QUEUE);
    let id = broadcaster.subscribe(WsSubscriber(tx));

    loop {
        tokio::select! {
            summary = rx.recv() => {
                // None: the broadcaster dropped us.
                let Some(summary) = summary else { break };
                let Ok(text) = serde_json::to_string(&summary) else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    broadcaster.unsubscribe(id);
}
