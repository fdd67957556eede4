mod barrier;
mod detection;
mod health;
mod settings;
mod vehicle;
mod video;

use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub use video::multipart_part;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start_detection", post(detection::start_detection))
        .route("/stop_detection", post(detection::stop_detection))
        .route("/video/stream", get(video::video_stream))
        .route("/video/frame", get(video::video_frame))
        .route("/ws/video", get(video::ws_video))
        .route("/video_feed/:camera_id", get(video::video_feed))
        .route("/vehicle/frame/:camera_id/:vehicle_id", get(vehicle::vehicle_frame))
        .route("/vehicle/plate", post(vehicle::vehicle_plate))
        .route("/available_plate", get(barrier::available_plate))
        .route("/barrier/check", get(barrier::barrier_check))
        .route("/barrier/status", get(barrier::barrier_status))
        .route("/settings", get(settings::get_settings).put(settings::put_settings))
        .route("/health", get(health::health))
        .with_state(state)
}
