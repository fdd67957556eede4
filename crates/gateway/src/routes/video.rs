use crate::auth::request_token;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bus::{fetch, keys};
use futures::StreamExt;
use pipeline::STREAM_INTERVAL;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::time::MissedTickBehavior;

const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// One `--frame` part of a `multipart/x-mixed-replace` body.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 96);
    payload.extend_from_slice(b"--frame\r\n");
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    payload.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

fn multipart_response(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn jpeg_response(jpeg: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        jpeg,
    )
        .into_response()
}

/// Shared preview as MJPEG; the connection counts as a viewer while open.
pub async fn video_stream(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    state
        .auth
        .verify(request_token(query.token.as_deref(), &headers))
        .await?;
    tracing::info!("MJPEG viewer connected");
    let frames = state
        .stream
        .stream()
        .map(|jpeg| Ok::<_, Infallible>(multipart_part(&jpeg)));
    Ok(multipart_response(Body::from_stream(frames)))
}

pub async fn video_frame(State(state): State<AppState>) -> Response {
    jpeg_response(state.stream.get_latest_frame())
}

/// Base64 JPEG text frames at the stream cadence, after token check.
pub async fn ws_video(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> ApiResult<Response> {
    state
        .auth
        .verify(request_token(query.token.as_deref(), &headers))
        .await?;
    let ws = ws.ok_or_else(|| ApiError::Validation("WebSocket upgrade required".into()))?;
    Ok(ws.on_upgrade(|socket| push_frames(socket, state)))
}

async fn push_frames(mut socket: WebSocket, state: AppState) {
    tracing::info!("WebSocket viewer connected");
    let frames = state.stream.stream();
    futures::pin_mut!(frames);

    while let Some(jpeg) = frames.next().await {
        if socket.send(Message::Text(BASE64.encode(&jpeg))).await.is_err() {
            break;
        }
    }
    tracing::info!("WebSocket viewer disconnected");
}

/// Processed frames of one camera session, straight from the bus.
/// Ends when the session lowers its processed flag.
pub async fn video_feed(State(state): State<AppState>, Path(camera_id): Path<String>) -> ApiResult<Response> {
    let frame_key = keys::processed_frame(&camera_id);
    let flag_key = keys::processed_flag(&camera_id);
    let bus = state.bus.clone();
    if !state.registry.is_active(&camera_id) && fetch(bus.as_ref(), &frame_key).is_none() {
        return Err(ApiError::NotFound(format!("No frames for camera {camera_id}")));
    }

    let frames = async_stream::stream! {
        let mut ticker = tokio::time::interval(STREAM_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if fetch(bus.as_ref(), &flag_key).as_deref() == Some(keys::FLAG_OFF) {
                break;
            }
            if let Some(jpeg) = fetch(bus.as_ref(), &frame_key) {
                yield Ok::<_, Infallible>(multipart_part(&jpeg));
            }
        }
        tracing::debug!(camera_id = %camera_id, "Camera feed ended");
    };
    Ok(multipart_response(Body::from_stream(frames)))
}
