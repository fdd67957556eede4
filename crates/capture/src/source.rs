use crate::{CaptureError, Frame, SourceSpec, ffmpeg::FfmpegSource};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Finite source: end of stream rewinds to the start.
    File,
    /// Camera or network stream: failures release and reconnect.
    Live,
}

/// Cross-thread release of a source's underlying handle.
///
/// Firing it makes a read blocked in the owning thread return an error, and
/// the source refuses to reopen afterwards. Sources whose reads are not
/// interruptible hand out a no-op.
#[derive(Clone, Default)]
pub struct Interrupt(Option<Arc<dyn Fn() + Send + Sync>>);

impl Interrupt {
    pub fn new(release: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(release)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    pub fn fire(&self) {
        if let Some(release) = &self.0 {
            release();
        }
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Interrupt")
            .field(&if self.is_noop() { "noop" } else { "armed" })
            .finish()
    }
}

/// A blocking frame producer owned by exactly one worker loop.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    fn describe(&self) -> String;

    /// Advance past the next frame without decoding it.
    fn grab(&mut self) -> Result<(), CaptureError>;

    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Seek back to the first frame. Live sources treat this as `reopen`.
    fn rewind(&mut self) -> Result<(), CaptureError>;

    fn reopen(&mut self) -> Result<(), CaptureError>;

    /// Drop the underlying handle. Idempotent.
    fn release(&mut self);

    fn is_open(&self) -> bool;

    /// Handle another thread can use to unblock a pending read.
    fn interrupt(&self) -> Interrupt {
        Interrupt::noop()
    }
}

pub trait SourceOpener: Send + Sync {
    /// Opens the source and reads a first frame, so unreachable sources fail here.
    fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Opens V4L2 devices directly and everything else through ffmpeg.
#[derive(Debug, Clone)]
pub struct DefaultOpener {
    pub frame_width: u32,
    pub frame_height: u32,
}

impl DefaultOpener {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
        }
    }
}

impl Default for DefaultOpener {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl SourceOpener for DefaultOpener {
    fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, CaptureError> {
        let source: Box<dyn FrameSource> = match spec {
            #[cfg(feature = "v4l2")]
            SourceSpec::Device(index) => Box::new(crate::device::V4lSource::open(
                *index,
                self.frame_width,
                self.frame_height,
            )?),
            #[cfg(not(feature = "v4l2"))]
            SourceSpec::Device(_) => {
                return Err(CaptureError::open(
                    spec.to_string(),
                    "built without V4L2 support",
                ));
            }
            SourceSpec::Stream(_) | SourceSpec::File(_) => Box::new(FfmpegSource::open(
                spec.clone(),
                self.frame_width,
                self.frame_height,
            )?),
        };
        tracing::info!(source = %spec, kind = ?source.kind(), "Capture source opened");
        Ok(source)
    }
}
