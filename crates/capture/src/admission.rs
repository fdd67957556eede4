/// Decides which frames are decoded and processed.
///
/// Only every `skip_frames`-th frame is admitted; the others are grabbed and
/// discarded so the source keeps pace with real time. The counter advances
/// only on frames that were actually obtained from the source.
#[derive(Debug, Clone)]
pub struct FrameAdmission {
    skip_frames: u32,
    frame_counter: u64,
}

impl FrameAdmission {
    /// `skip_frames` of 0 is treated as 1 (process every frame).
    pub fn new(skip_frames: u32) -> Self {
        Self {
            skip_frames: skip_frames.max(1),
            frame_counter: 0,
        }
    }

    pub fn should_process(&self) -> bool {
        self.frame_counter.is_multiple_of(u64::from(self.skip_frames))
    }

    pub fn advance(&mut self) {
        self.frame_counter = self.frame_counter.wrapping_add(1);
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn skip_frames(&self) -> u32 {
        self.skip_frames
    }
}
