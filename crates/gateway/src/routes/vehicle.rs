use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use bus::{fetch, keys};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct PlateRequest {
    pub camera_id: String,
    pub vehicle_id: u32,
}

fn crop(state: &AppState, camera_id: &str, vehicle_id: u32) -> ApiResult<Vec<u8>> {
    fetch(state.bus.as_ref(), &keys::vehicle_crop(camera_id, vehicle_id)).ok_or_else(|| {
        ApiError::NotFound(format!("No frame for vehicle {vehicle_id} on camera {camera_id}"))
    })
}

pub async fn vehicle_frame(
    State(state): State<AppState>,
    Path((camera_id, vehicle_id)): Path<(String, u32)>,
) -> ApiResult<Response> {
    let jpeg = crop(&state, &camera_id, vehicle_id)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

/// Forwards the latest crop of a tracked vehicle to the plate service.
pub async fn vehicle_plate(
    State(state): State<AppState>,
    Json(request): Json<PlateRequest>,
) -> ApiResult<Json<Value>> {
    let jpeg = crop(&state, &request.camera_id, request.vehicle_id)?;
    let response = state.plates.query(jpeg).await.map_err(|e| {
        tracing::warn!(camera_id = %request.camera_id, vehicle_id = request.vehicle_id, error = %e, "Plate lookup failed");
        ApiError::Upstream(format!("{e:#}"))
    })?;
    Ok(Json(response))
}
