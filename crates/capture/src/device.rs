use crate::decoder::{FrameDecoder, MjpegDecoder, YuyvDecoder};
use crate::{CaptureError, Frame, FrameSource, SourceKind};
use v4l::{
    Device, FourCC,
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
    video::Capture,
};

const BUFFER_COUNT: u32 = 4;

const FOURCC_YUYV: FourCC = FourCC { repr: *b"YUYV" };
const FOURCC_MJPG: FourCC = FourCC { repr: *b"MJPG" };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

/// Select pixel format: prefer YUYV (cheaper decode), fall back to MJPEG.
fn select_format(device: &Device, name: &str) -> Result<PixelFormat, CaptureError> {
    let formats = device.enum_formats()?;

    for fmt in &formats {
        tracing::debug!("  {:?}: {}", fmt.fourcc, fmt.description);
    }

    if formats.iter().any(|f| f.fourcc == FOURCC_YUYV) {
        return Ok(PixelFormat::Yuyv);
    }
    if formats.iter().any(|f| f.fourcc == FOURCC_MJPG) {
        return Ok(PixelFormat::Mjpeg);
    }

    Err(CaptureError::open(
        name,
        format!(
            "supports neither YUYV nor MJPEG (available: {:?})",
            formats.iter().map(|f| f.fourcc).collect::<Vec<_>>()
        ),
    ))
}

struct OpenDevice {
    // Field order matters: the stream must drop before the device.
    stream: Stream<'static>,
    _device: Device,
    width: u32,
    height: u32,
    decoder: Box<dyn FrameDecoder>,
}

fn open_device(index: u32, width: u32, height: u32) -> Result<OpenDevice, CaptureError> {
    let name = format!("/dev/video{index}");
    let device = Device::new(index as usize).map_err(|e| CaptureError::open(&name, e))?;

    let caps = device.query_caps()?;
    tracing::info!("Camera opened: {} ({})", caps.card, caps.driver);

    let pixel_format = select_format(&device, &name)?;
    let mut format = device.format()?;
    format.fourcc = match pixel_format {
        PixelFormat::Yuyv => FOURCC_YUYV,
        PixelFormat::Mjpeg => FOURCC_MJPG,
    };
    format.width = width;
    format.height = height;
    let format = device.set_format(&format)?;

    tracing::info!(
        "Capture format: {}x{} {:?} ({:?})",
        format.width,
        format.height,
        format.fourcc,
        pixel_format
    );

    let decoder: Box<dyn FrameDecoder> = match pixel_format {
        PixelFormat::Yuyv => Box::new(YuyvDecoder::new()),
        PixelFormat::Mjpeg => Box::new(MjpegDecoder::new()?),
    };

    let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
        .map_err(|e| CaptureError::open(&name, e))?;

    Ok(OpenDevice {
        stream,
        _device: device,
        width: format.width,
        height: format.height,
        decoder,
    })
}

/// Local camera captured through V4L2 memory-mapped buffers.
pub struct V4lSource {
    index: u32,
    requested: (u32, u32),
    open: Option<OpenDevice>,
}

impl V4lSource {
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self, CaptureError> {
        let mut source = Self {
            index,
            requested: (width, height),
            open: None,
        };
        source.reopen()?;
        Ok(source)
    }
}

impl FrameSource for V4lSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn describe(&self) -> String {
        format!("/dev/video{}", self.index)
    }

    fn grab(&mut self) -> Result<(), CaptureError> {
        let dev = self.open.as_mut().ok_or(CaptureError::Released)?;
        dev.stream.next().map(drop).map_err(Into::into)
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let dev = self.open.as_mut().ok_or(CaptureError::Released)?;
        let (raw, _meta) = dev.stream.next()?;
        let (width, height) = (dev.width, dev.height);
        let rgb = dev.decoder.decode(raw, width, height)?.to_vec();
        let (w, h) = dev.decoder.dimensions(width, height);
        Frame::from_raw(w, h, rgb)
            .ok_or_else(|| CaptureError::Decode("decoded buffer smaller than frame".into()))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.reopen()
    }

    fn reopen(&mut self) -> Result<(), CaptureError> {
        self.release();
        let (width, height) = self.requested;
        let mut dev = open_device(self.index, width, height)?;
        dev.stream
            .next()
            .map_err(|e| CaptureError::open(self.describe(), e))?;
        self.open = Some(dev);
        Ok(())
    }

    fn release(&mut self) {
        if self.open.take().is_some() {
            tracing::debug!(device = self.index, "Camera released");
        }
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }
}
