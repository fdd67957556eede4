use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open source {source_name}: {reason}")]
    Open { source_name: String, reason: String },

    #[error("End of stream")]
    EndOfStream,

    #[error("Source is released")]
    Released,

    #[error("Frame read failed: {0}")]
    Read(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CaptureError {
    pub fn open(source_name: impl Into<String>, reason: impl ToString) -> Self {
        CaptureError::Open {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}
