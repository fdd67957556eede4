use crate::state::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_cameras": state.registry.active(),
        "viewers": state.stream.viewers(),
        "barrier": state.barrier.get_status().status.as_str(),
    }))
}
