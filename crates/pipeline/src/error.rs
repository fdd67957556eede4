use crate::region::RegionError;
use capture::CaptureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No active session for camera {0}")]
    NotFound(String),

    #[error("Camera {0} is still shutting down")]
    Busy(String),

    #[error("Invalid camera id {0:?}")]
    InvalidCameraId(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Invalid region: {0}")]
    Region(#[from] RegionError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
