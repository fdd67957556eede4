//! Frame annotation, placeholder frames and JPEG encoding.

use crate::region::Region;
use ab_glyph::{FontVec, PxScale};
use anyhow::Context;
use image::{Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use inference::{TrackedObject, class_name};
use std::path::Path;

const JPEG_QUALITY: u8 = 80;

pub const INSIDE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const OUTSIDE_COLOR: Rgb<u8> = Rgb([220, 30, 30]);
const REGION_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;
const PLACEHOLDER_BACKGROUND: Rgb<u8> = Rgb([24, 24, 32]);
const PLACEHOLDER_STRIPE: Rgb<u8> = Rgb([90, 60, 0]);

const FALLBACK_FONTS: [&str; 2] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];

pub fn encode_jpeg(frame: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(frame.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(frame)?;
    Ok(out)
}

/// One object to draw. `inside` is `None` when no region applies.
pub struct Annotation<'a> {
    pub object: &'a TrackedObject,
    pub inside: Option<bool>,
}

pub fn label_for(object: &TrackedObject, inside: Option<bool>) -> String {
    let id = object
        .track_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let name = class_name(object.class_id);
    match inside {
        Some(true) => format!("{name} ID:{id} IN"),
        Some(false) => format!("{name} ID:{id} OUT"),
        None => format!("{name} ID:{id}"),
    }
}

/// Draws boxes, labels and the region outline. Text needs a TrueType font;
/// without one only shapes are drawn.
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
    /// Text-free placeholder encoded at construction, served if a later encode fails.
    fallback: Vec<u8>,
}

impl Annotator {
    pub fn without_font() -> anyhow::Result<Self> {
        let mut annotator = Self {
            font: None,
            scale: PxScale::from(18.0),
            fallback: Vec::new(),
        };
        annotator.fallback =
            encode_jpeg(&annotator.placeholder("")).context("Failed to encode fallback placeholder")?;
        Ok(annotator)
    }

    /// Loads the configured font, falling back to common system locations.
    pub fn load(font_path: Option<&Path>) -> anyhow::Result<Self> {
        let candidates = font_path
            .into_iter()
            .map(Path::to_path_buf)
            .chain(FALLBACK_FONTS.iter().map(|p| Path::new(p).to_path_buf()));

        for path in candidates {
            match std::fs::read(&path).map(FontVec::try_from_vec) {
                Ok(Ok(font)) => {
                    tracing::info!(font = %path.display(), "Annotation font loaded");
                    return Ok(Self {
                        font: Some(font),
                        ..Self::without_font()?
                    });
                }
                Ok(Err(e)) => tracing::warn!(font = %path.display(), error = %e, "Invalid font file"),
                Err(e) => tracing::debug!(font = %path.display(), error = %e, "Font not readable"),
            }
        }
        tracing::warn!("No annotation font available, labels will not be drawn");
        Self::without_font()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, frame: &mut RgbImage, annotations: &[Annotation<'_>], region: Option<&Region>) {
        if let Some(region) = region {
            self.draw_region(frame, region);
        }
        for a in annotations {
            let color = if a.inside == Some(false) {
                OUTSIDE_COLOR
            } else {
                INSIDE_COLOR
            };
            let Some((x, y, w, h)) = a.object.bbox.clamp_to(frame.width(), frame.height()) else {
                continue;
            };
            let rect = Rect::at(x as i32, y as i32).of_size(w, h);
            draw_hollow_rect_mut(frame, rect, color);
            if w > 2 && h > 2 {
                let inner = Rect::at(x as i32 + 1, y as i32 + 1).of_size(w - 2, h - 2);
                draw_hollow_rect_mut(frame, inner, color);
            }
            self.draw_label(frame, &label_for(a.object, a.inside), x as i32, y as i32, color);
        }
    }

    fn draw_region(&self, frame: &mut RgbImage, region: &Region) {
        let points = region.points();
        for (i, a) in points.iter().enumerate() {
            let b = points[(i + 1) % points.len()];
            draw_line_segment_mut(frame, (a.x, a.y), (b.x, b.y), REGION_COLOR);
        }
        if let Some(first) = points.first() {
            self.draw_label(frame, "Region", first.x as i32, first.y as i32, REGION_COLOR);
        }
    }

    /// Label on a filled background just above (x, y), or inside the top edge
    /// when there is no room above.
    fn draw_label(&self, frame: &mut RgbImage, text: &str, x: i32, y: i32, background: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let (tw, th) = text_size(self.scale, font, text);
        let top = if y >= th as i32 + 4 { y - th as i32 - 4 } else { y };
        draw_filled_rect_mut(frame, Rect::at(x, top).of_size(tw + 4, th + 4), background);
        draw_text_mut(frame, TEXT_COLOR, x + 2, top + 2, self.scale, font, text);
    }

    /// Status frame published when no real frame is available.
    ///
    /// Diagonal stripes make it recognizable even when no font is loaded.
    pub fn placeholder(&self, message: &str) -> RgbImage {
        let mut frame = RgbImage::from_fn(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, |x, y| {
            if (x + y) % 64 < 8 {
                PLACEHOLDER_STRIPE
            } else {
                PLACEHOLDER_BACKGROUND
            }
        });
        if let Some(font) = &self.font {
            let scale = PxScale::from(28.0);
            let (tw, th) = text_size(scale, font, message);
            let x = (PLACEHOLDER_WIDTH.saturating_sub(tw) / 2) as i32;
            let y = (PLACEHOLDER_HEIGHT.saturating_sub(th) / 2) as i32;
            draw_filled_rect_mut(
                &mut frame,
                Rect::at(x - 12, y - 12).of_size(tw + 24, th + 24),
                PLACEHOLDER_BACKGROUND,
            );
            draw_text_mut(&mut frame, TEXT_COLOR, x, y, scale, font, message);
        }
        frame
    }

    pub fn placeholder_jpeg(&self, message: &str) -> Vec<u8> {
        match encode_jpeg(&self.placeholder(message)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode placeholder frame");
                self.fallback.clone()
            }
        }
    }
}
