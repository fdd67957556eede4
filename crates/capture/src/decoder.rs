use crate::CaptureError;

/// Decodes raw camera buffers to packed RGB (3 bytes per pixel).
pub trait FrameDecoder: Send {
    /// Returns a view into the decoder's internal buffer.
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<&[u8], CaptureError>;

    /// Size of the last decoded frame. Formats that carry their own header
    /// (MJPEG) may differ from the negotiated size.
    fn dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        (width, height)
    }
}

/// YUYV (YUV 4:2:2): 2 pixels packed in 4 bytes `[Y0, U, Y1, V]`.
#[derive(Default)]
pub struct YuyvDecoder {
    rgb_buffer: Vec<u8>,
}

impl YuyvDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for YuyvDecoder {
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<&[u8], CaptureError> {
        let rgb_size = (width * height * 3) as usize;
        let bytes_per_row = (width * 2) as usize;
        if height == 0 || raw.len() < bytes_per_row * height as usize {
            return Err(CaptureError::Decode(format!(
                "YUYV buffer of {} bytes too small for {width}x{height}",
                raw.len()
            )));
        }
        self.rgb_buffer.resize(rgb_size, 0);
        let stride = raw.len() / height as usize;

        let mut out_idx = 0;
        for row in 0..height as usize {
            let row_start = row * stride;
            let row_data = &raw[row_start..row_start + bytes_per_row];

            for chunk in row_data.chunks_exact(4) {
                let y0 = chunk[0] as i32;
                let u = chunk[1] as i32 - 128;
                let y1 = chunk[2] as i32;
                let v = chunk[3] as i32 - 128;

                // BT.601, 8-bit fixed point
                let rv = (359 * v) >> 8;
                let gu = (88 * u + 183 * v) >> 8;
                let bu = (454 * u) >> 8;

                for y in [y0, y1] {
                    self.rgb_buffer[out_idx] = (y + rv).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 1] = (y - gu).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 2] = (y + bu).clamp(0, 255) as u8;
                    out_idx += 3;
                }
            }
        }

        Ok(&self.rgb_buffer[..rgb_size])
    }
}

/// MJPEG decoder backed by libjpeg-turbo.
pub struct MjpegDecoder {
    decompressor: turbojpeg::Decompressor,
    rgb_buffer: Vec<u8>,
    last: (u32, u32),
}

impl MjpegDecoder {
    pub fn new() -> Result<Self, CaptureError> {
        let decompressor =
            turbojpeg::Decompressor::new().map_err(|e| CaptureError::Decode(e.to_string()))?;
        Ok(Self {
            decompressor,
            rgb_buffer: Vec::new(),
            last: (0, 0),
        })
    }
}

impl FrameDecoder for MjpegDecoder {
    fn decode(&mut self, raw: &[u8], _width: u32, _height: u32) -> Result<&[u8], CaptureError> {
        let header = self
            .decompressor
            .read_header(raw)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
        let (width, height) = (header.width, header.height);
        let rgb_size = width * height * 3;
        self.rgb_buffer.resize(rgb_size, 0);

        let output = turbojpeg::Image {
            pixels: &mut self.rgb_buffer[..rgb_size],
            width,
            pitch: width * 3,
            height,
            format: turbojpeg::PixelFormat::RGB,
        };
        self.decompressor
            .decompress(raw, output)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
        self.last = (width as u32, height as u32);

        Ok(&self.rgb_buffer[..rgb_size])
    }

    fn dimensions(&self, _width: u32, _height: u32) -> (u32, u32) {
        self.last
    }
}
