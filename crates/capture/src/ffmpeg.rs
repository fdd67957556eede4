use crate::{CaptureError, Frame, FrameSource, Interrupt, SourceKind, SourceSpec};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

/// The running ffmpeg child, shared with interrupt handles.
#[derive(Default)]
struct ProcessSlot {
    child: Option<Child>,
    interrupted: bool,
}

/// Files and network streams decoded to raw RGB by an ffmpeg subprocess.
///
/// Frames are scaled to a fixed size so every read is exactly
/// `width * height * 3` bytes from ffmpeg's stdout. Killing the child from
/// another thread closes that pipe, which ends a blocked read.
pub struct FfmpegSource {
    spec: SourceSpec,
    width: u32,
    height: u32,
    slot: Arc<Mutex<ProcessSlot>>,
    stdout: Option<ChildStdout>,
    pending: Option<Vec<u8>>,
}

impl FfmpegSource {
    pub fn open(spec: SourceSpec, width: u32, height: u32) -> Result<Self, CaptureError> {
        if let SourceSpec::File(path) = &spec
            && !path.is_file()
        {
            return Err(CaptureError::open(spec.to_string(), "file not found"));
        }
        let mut source = Self::unopened(spec, width, height);
        source.spawn()?;
        Ok(source)
    }

    fn unopened(spec: SourceSpec, width: u32, height: u32) -> Self {
        Self {
            spec,
            width,
            height,
            slot: Arc::default(),
            stdout: None,
            pending: None,
        }
    }

    fn slot(&self) -> MutexGuard<'_, ProcessSlot> {
        lock_slot(&self.slot)
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        match &self.spec {
            SourceSpec::File(path) => {
                cmd.arg("-re").arg("-i").arg(path);
            }
            SourceSpec::Stream(url) => {
                if url.to_ascii_lowercase().starts_with("rtsp") {
                    cmd.args(["-rtsp_transport", "tcp"]);
                }
                cmd.args(["-fflags", "nobuffer", "-flags", "low_delay", "-i", url]);
            }
            SourceSpec::Device(index) => {
                cmd.args(["-f", "v4l2", "-i"]).arg(format!("/dev/video{index}"));
            }
        }
        cmd.args([
            "-an",
            "-vf",
            &format!("scale={}:{}", self.width, self.height),
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
        cmd
    }

    /// Starts ffmpeg and blocks until the first frame arrives.
    fn spawn(&mut self) -> Result<(), CaptureError> {
        self.release();
        let name = self.spec.to_string();
        let stdout = {
            let mut slot = self.slot();
            if slot.interrupted {
                return Err(CaptureError::open(&name, "source interrupted"));
            }
            let mut child = self
                .command()
                .spawn()
                .map_err(|e| CaptureError::open(&name, format!("ffmpeg: {e}")))?;
            let Some(stdout) = child.stdout.take() else {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::open(&name, "ffmpeg stdout unavailable"));
            };
            slot.child = Some(child);
            stdout
        };
        self.stdout = Some(stdout);

        match self.next_raw() {
            Ok(first) => {
                self.pending = Some(first);
                Ok(())
            }
            Err(e) => {
                self.release();
                Err(CaptureError::open(name, e))
            }
        }
    }

    fn next_raw(&mut self) -> Result<Vec<u8>, CaptureError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        let len = self.frame_len();
        let kind = self.kind();
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(CaptureError::Released);
        };
        let mut buf = vec![0u8; len];
        match stdout.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => match kind {
                SourceKind::File => Err(CaptureError::EndOfStream),
                SourceKind::Live => Err(CaptureError::Read("stream closed".into())),
            },
            Err(e) => Err(e.into()),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn kind(&self) -> SourceKind {
        if self.spec.is_file() {
            SourceKind::File
        } else {
            SourceKind::Live
        }
    }

    fn describe(&self) -> String {
        self.spec.to_string()
    }

    fn grab(&mut self) -> Result<(), CaptureError> {
        self.next_raw().map(drop)
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let raw = self.next_raw()?;
        Frame::from_raw(self.width, self.height, raw)
            .ok_or_else(|| CaptureError::Decode("short rgb24 frame".into()))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        tracing::debug!(source = %self.spec, "Rewinding");
        self.spawn()
    }

    fn reopen(&mut self) -> Result<(), CaptureError> {
        self.spawn()
    }

    fn release(&mut self) {
        self.pending = None;
        self.stdout = None;
        let child = self.slot().child.take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill() {
                tracing::trace!(error = %e, "ffmpeg already exited");
            }
            let _ = child.wait();
        }
    }

    fn is_open(&self) -> bool {
        self.stdout.is_some()
    }

    fn interrupt(&self) -> Interrupt {
        let slot = Arc::clone(&self.slot);
        let name = self.spec.to_string();
        Interrupt::new(move || {
            let mut slot = lock_slot(&slot);
            slot.interrupted = true;
            if let Some(child) = slot.child.as_mut() {
                tracing::debug!(source = %name, "Interrupting ffmpeg");
                if let Err(e) = child.kill() {
                    tracing::trace!(error = %e, "ffmpeg already exited");
                }
            }
        })
    }
}

fn lock_slot(slot: &Mutex<ProcessSlot>) -> MutexGuard<'_, ProcessSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}
