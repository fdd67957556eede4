use super::LetterboxTransform;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbImage;
use ndarray::{Array, IxDyn};

pub const DEFAULT_INPUT_SIZE: u32 = 640;
const LETTERBOX_COLOR: u8 = 114;

/// Letterboxes frames into a square model input and normalizes to `[1, 3, H, W]` in `[0, 1]`.
pub struct PreProcessor {
    pub input_size: u32,
    rgb_buffer: Vec<u8>,
    letterboxed_buffer: Vec<u8>,
    resizer: Resizer,
}

impl PreProcessor {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            rgb_buffer: Vec::new(),
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size * input_size * 3) as usize],
            resizer: Resizer::new(),
        }
    }

    pub fn preprocess(
        &mut self,
        frame: &RgbImage,
    ) -> anyhow::Result<(Array<f32, IxDyn>, LetterboxTransform)> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} frame", width, height);
        }
        tracing::trace!(width, height, "Preprocessing frame");

        self.rgb_buffer.clear();
        self.rgb_buffer.extend_from_slice(frame.as_raw());

        let transform = self.resize_and_letterbox(width, height)?;
        Ok((self.normalize()?, transform))
    }

    fn resize_and_letterbox(
        &mut self,
        width: u32,
        height: u32,
    ) -> anyhow::Result<LetterboxTransform> {
        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, size);
        let new_height = ((height as f32 * scale) as u32).clamp(1, size);

        let offset_x = (size - new_width) / 2;
        let offset_y = (size - new_height) / 2;

        let src = Image::from_slice_u8(width, height, &mut self.rgb_buffer, PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);
        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);
        let resized_data = resized.buffer();
        let stride = size * 3;
        let row_len = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;
            self.letterboxed_buffer[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        Ok(LetterboxTransform {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        })
    }

    fn normalize(&self) -> anyhow::Result<Array<f32, IxDyn>> {
        let side = self.input_size as usize;
        let spatial = side * side;
        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.letterboxed_buffer.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, side, side]), output)?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}
