use sfm_core::Keypoint;

/// Keypoint with corner response score for NMS
#[derive(Debug, Clone, Copy)]
pub struct ScoredKeypoint {
    pub keypoint: Keypoint,
    pub response: f32,
}

/// Scale information for pyramid levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

impl ScaleLevel {
    /// Per-axis factors that map level pixels back to level-0 pixels
    pub fn to_base(&self, base_width: usize, base_height: usize) -> (f32, f32) {
        (
            base_width as f32 / self.width as f32,
            base_height as f32 / self.height as f32,
        )
    }
}
