use crate::state::AppState;
use axum::{Json, extract::State};
use controller::CheckOutcome;
use serde_json::{Value, json};

fn outcome(outcome: CheckOutcome) -> Json<Value> {
    Json(json!({ "status": outcome.as_str() }))
}

/// Authorization check only, never moves the barrier.
pub async fn available_plate(State(state): State<AppState>) -> Json<Value> {
    outcome(state.barrier.check_plate().await)
}

pub async fn barrier_check(State(state): State<AppState>) -> Json<Value> {
    outcome(state.barrier.check_and_raise().await)
}

pub async fn barrier_status(State(state): State<AppState>) -> Json<Value> {
    let current = state.barrier.get_status();
    Json(json!({
        "status": current.status.as_str(),
        "raised_at": current.raised_at.map(|t| t.to_rfc3339()),
    }))
}
