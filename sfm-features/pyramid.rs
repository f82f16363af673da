use crate::error::{FeatureError, FeatureResult};
use crate::types::ScaleLevel;
use crate::utils::bilinear;

/// Levels smaller than this on either side are not generated
const MIN_LEVEL_SIZE: usize = 32;

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Generate scale levels for image pyramid. Level 0 is always present.
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        max_levels: usize,
        scale_factor: f32,
    ) -> Vec<ScaleLevel> {
        let mut levels = vec![ScaleLevel { level: 0, scale: 1.0, width, height }];
        let mut current_scale = 1.0f32;

        for level in 1..max_levels {
            current_scale *= scale_factor;
            let scaled_width = ((width as f32) / current_scale) as usize;
            let scaled_height = ((height as f32) / current_scale) as usize;
            if scaled_width < MIN_LEVEL_SIZE || scaled_height < MIN_LEVEL_SIZE {
                break;
            }
            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });
        }

        levels
    }

    /// Build one grayscale buffer per scale level
    pub fn build(gray: &[u8], width: usize, height: usize, levels: &[ScaleLevel]) -> FeatureResult<Vec<Vec<u8>>> {
        if gray.len() != width * height {
            return Err(FeatureError::InvalidImageData {
                expected_len: width * height,
                actual_len: gray.len(),
            });
        }

        let base: Vec<f32> = gray.iter().map(|&v| v as f32).collect();
        let pyramid = levels
            .iter()
            .map(|lvl| {
                if lvl.level == 0 {
                    gray.to_vec()
                } else {
                    Self::downsample(&base, width, height, lvl.width, lvl.height)
                }
            })
            .collect();
        Ok(pyramid)
    }

    /// Downsample using bilinear interpolation at pixel centres
    fn downsample(base: &[f32], src_width: usize, src_height: usize, target_width: usize, target_height: usize) -> Vec<u8> {
        let x_ratio = src_width as f32 / target_width as f32;
        let y_ratio = src_height as f32 / target_height as f32;

        let mut out = vec![0u8; target_width * target_height];
        for y in 0..target_height {
            let src_y = (y as f32 + 0.5) * y_ratio - 0.5;
            for x in 0..target_width {
                let src_x = (x as f32 + 0.5) * x_ratio - 0.5;
                let v = bilinear(base, src_width, src_height, src_x, src_y);
                out[y * target_width + x] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}
