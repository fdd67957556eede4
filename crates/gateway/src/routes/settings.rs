use crate::auth::request_token;
use crate::error::{ApiError, ApiResult};
use crate::routes::video::TokenQuery;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use serde_json::Value;

pub async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(state.stream.settings().public_view())
}

/// Partial update, applied to the preview loop. Nothing is written to disk.
pub async fn put_settings(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Value>> {
    state
        .auth
        .verify(request_token(query.token.as_deref(), &headers))
        .await?;

    let current = state.stream.settings();
    let updated = current
        .merged(patch)
        .map_err(|e| ApiError::Validation(format!("Invalid settings: {e}")))?;
    let model_changed = updated.detection_model != current.detection_model;

    tracing::info!(
        source_type = ?updated.source_type,
        target = %updated.detection_target,
        model = %updated.detection_model,
        "Settings updated"
    );
    let view = updated.public_view();
    let model = updated.detection_model.clone();
    state.stream.update_settings(updated);
    if model_changed {
        state.stream.update_model(&model);
    }
    Ok(Json(view))
}
