pub mod post;
pub mod pre;

/// Mapping between frame coordinates and the letterboxed model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}
