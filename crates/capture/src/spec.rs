use std::fmt;
use std::path::PathBuf;

const LIVE_SCHEMES: [&str; 5] = ["rtsp://", "rtsps://", "http://", "https://", "udp://"];

/// Where frames come from, parsed from the user-facing source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Local V4L2 device index (`0` → `/dev/video0`).
    Device(u32),
    /// Network stream decoded by ffmpeg.
    Stream(String),
    /// Video file, looped on end of stream.
    File(PathBuf),
}

impl SourceSpec {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if let Ok(index) = source.parse::<u32>() {
            return SourceSpec::Device(index);
        }
        let lower = source.to_ascii_lowercase();
        if LIVE_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return SourceSpec::Stream(source.to_string());
        }
        SourceSpec::File(PathBuf::from(source))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, SourceSpec::File(_))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Device(index) => write!(f, "/dev/video{index}"),
            SourceSpec::Stream(url) => f.write_str(url),
            SourceSpec::File(path) => write!(f, "{}", path.display()),
        }
    }
}
