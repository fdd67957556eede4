pub mod admission;
#[cfg(feature = "v4l2")]
pub mod decoder;
#[cfg(feature = "v4l2")]
pub mod device;
pub mod error;
pub mod ffmpeg;
pub mod source;
pub mod spec;

pub use admission::FrameAdmission;
pub use error::CaptureError;
pub use source::{DefaultOpener, FrameSource, Interrupt, SourceKind, SourceOpener};
pub use spec::SourceSpec;

/// Decoded frame, always 8-bit RGB.
pub type Frame = image::RgbImage;
