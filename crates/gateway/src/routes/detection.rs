use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{Json, extract::State};
use capture::SourceSpec;
use inference::DetectionTarget;
use pipeline::{Region, RegionSpec, SessionConfig, StartOutcome};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct StartDetectionRequest {
    /// Device index, stream URL or file path.
    pub source: Value,
    pub camera_id: String,
    #[serde(default = "default_skip_frames")]
    pub skip_frames: u32,
    #[serde(default)]
    pub region: Option<RegionSpec>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_skip_frames() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct StopDetectionRequest {
    pub camera_id: String,
}

fn source_spec(source: &Value) -> ApiResult<SourceSpec> {
    let raw = match source {
        Value::Number(n) => n.to_string(),
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(ApiError::Validation("source must be a device index, URL or path".into())),
    };
    Ok(SourceSpec::parse(&raw))
}

pub async fn start_detection(
    State(state): State<AppState>,
    Json(request): Json<StartDetectionRequest>,
) -> ApiResult<Json<Value>> {
    let source = source_spec(&request.source)?;
    let region = request
        .region
        .map(Region::try_from)
        .transpose()
        .map_err(|e| ApiError::Validation(format!("Invalid region: {e}")))?;

    let settings = state.stream.settings();
    // Presence tracking needs detections even when the preview has them off.
    let target = match settings.target() {
        DetectionTarget::None => DetectionTarget::Vehicles,
        target => target,
    };
    let config = SessionConfig {
        camera_id: request.camera_id.clone(),
        source,
        skip_frames: request.skip_frames,
        region,
        model: request.model.unwrap_or(settings.detection_model),
        classes: target.classes().to_vec(),
        backoff: Default::default(),
    };

    let registry = state.registry.clone();
    let outcome = tokio::task::spawn_blocking(move || registry.start(config)).await??;
    let message = match outcome {
        StartOutcome::Started => "Detection started",
        StartOutcome::Replaced => "Detection restarted",
    };
    Ok(Json(json!({ "message": message, "camera_id": request.camera_id })))
}

pub async fn stop_detection(
    State(state): State<AppState>,
    Json(request): Json<StopDetectionRequest>,
) -> ApiResult<Json<Value>> {
    let registry = state.registry.clone();
    let camera_id = request.camera_id.clone();
    tokio::task::spawn_blocking(move || registry.stop(&camera_id)).await??;
    Ok(Json(json!({
        "message": format!("Detection stopped for Camera ID {}", request.camera_id)
    })))
}
