use rayon::prelude::*;
use sfm_core::Keypoint;

use crate::config::FeatureConfig;
use crate::error::{FeatureError, FeatureResult};
use crate::pyramid::ImagePyramid;
use crate::refinement::KeypointRefinement;
use crate::types::{ScaleLevel, ScoredKeypoint};
use crate::utils::{has_consecutive_bits, FAST_ARC, FAST_CIRCLE};

/// FAST needs a 3-pixel border on each side
const MIN_SIZE: usize = 7;

/// Multi-scale FAST-9 corner detector
#[derive(Debug, Clone)]
pub struct FastDetector {
    cfg: FeatureConfig,
}

impl FastDetector {
    /// Creates a new detector with validation
    pub fn new(cfg: FeatureConfig) -> FeatureResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.cfg
    }

    fn validate_image(gray: &[u8], width: usize, height: usize) -> FeatureResult<()> {
        if width == 0 || height == 0 {
            return Err(FeatureError::InvalidImageSize { width, height });
        }
        if width < MIN_SIZE || height < MIN_SIZE {
            return Err(FeatureError::ImageTooSmall { width, height, min_size: MIN_SIZE });
        }
        if gray.len() != width * height {
            return Err(FeatureError::InvalidImageData {
                expected_len: width * height,
                actual_len: gray.len(),
            });
        }
        Ok(())
    }

    /// Detect keypoints in level-0 coordinates, strongest first
    pub fn detect(&self, gray: &[u8], width: usize, height: usize) -> FeatureResult<Vec<Keypoint>> {
        Ok(self
            .detect_with_response(gray, width, height)?
            .into_iter()
            .map(|sk| sk.keypoint)
            .collect())
    }

    /// Detect keypoints across every pyramid level with response scores
    pub fn detect_with_response(&self, gray: &[u8], width: usize, height: usize) -> FeatureResult<Vec<ScoredKeypoint>> {
        Self::validate_image(gray, width, height)?;

        let levels = ImagePyramid::generate_scale_levels(width, height, self.cfg.pyramid_levels, self.cfg.scale_factor);
        let pyramid = ImagePyramid::build(gray, width, height, &levels)?;

        let per_level: Vec<Vec<ScoredKeypoint>> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .map(|(level, img)| self.detect_at_level(img, level, width, height))
            .collect();

        let mut all: Vec<ScoredKeypoint> = per_level.into_iter().flatten().collect();
        all.sort_by(|a, b| b.response.total_cmp(&a.response));
        if self.cfg.max_features > 0 {
            all.truncate(self.cfg.max_features);
        }
        Ok(all)
    }

    /// Detect, suppress, refine and orient corners on one level
    fn detect_at_level(&self, img: &[u8], level: &ScaleLevel, base_width: usize, base_height: usize) -> Vec<ScoredKeypoint> {
        let (w, h) = (level.width, level.height);
        if w < MIN_SIZE || h < MIN_SIZE {
            return Vec::new();
        }
        let threshold = self.cfg.threshold;

        let raw: Vec<ScoredKeypoint> = (3..h - 3)
            .into_par_iter()
            .flat_map_iter(|y| {
                (3..w - 3).filter_map(move |x| {
                    corner_score(img, w, x, y, threshold).map(|response| ScoredKeypoint {
                        keypoint: Keypoint::new(x as f32, y as f32),
                        response,
                    })
                })
            })
            .collect();

        let kept = KeypointRefinement::non_maximum_suppression(&raw, self.cfg.nms_distance);
        let (sx, sy) = level.to_base(base_width, base_height);
        let radius = (self.cfg.patch_size / 2) as i32;

        kept.into_iter()
            .map(|sk| {
                let (x, y) = (sk.keypoint.x as usize, sk.keypoint.y as usize);
                let (ox, oy) = if self.cfg.subpixel_refinement {
                    KeypointRefinement::subpixel_offset(&score_neighbourhood(img, w, h, x, y, threshold))
                } else {
                    (0.0, 0.0)
                };
                let angle = KeypointRefinement::compute_orientation(img, w, h, x, y, radius);

                // Pixel-centre convention matches the pyramid resampling
                let kp = Keypoint {
                    x: (x as f32 + ox + 0.5) * sx - 0.5,
                    y: (y as f32 + oy + 0.5) * sy - 0.5,
                    angle,
                    response: sk.response,
                    scale: level.scale,
                    octave: level.level as u8,
                };
                ScoredKeypoint { keypoint: kp, response: sk.response }
            })
            .collect()
    }
}

/// FAST-9 segment test. Returns the summed contrast above threshold over the
/// qualifying arc side, or `None` when (x, y) is not a corner. Caller keeps
/// (x, y) at least 3 pixels from the border.
pub fn corner_score(img: &[u8], width: usize, x: usize, y: usize, threshold: u8) -> Option<f32> {
    let p = img[y * width + x] as i32;
    let t = threshold as i32;
    let mut bright = 0u16;
    let mut dark = 0u16;
    let mut bright_sum = 0i32;
    let mut dark_sum = 0i32;

    for (i, &(dx, dy)) in FAST_CIRCLE.iter().enumerate() {
        let q = img[(y as i32 + dy) as usize * width + (x as i32 + dx) as usize] as i32;
        if q >= p + t {
            bright |= 1 << i;
            bright_sum += q - p - t;
        } else if q <= p - t {
            dark |= 1 << i;
            dark_sum += p - q - t;
        }
    }

    let is_bright = has_consecutive_bits(bright, FAST_ARC);
    let is_dark = has_consecutive_bits(dark, FAST_ARC);
    match (is_bright, is_dark) {
        (true, _) if bright_sum >= dark_sum || !is_dark => Some(bright_sum as f32 + 1.0),
        (_, true) => Some(dark_sum as f32 + 1.0),
        _ => None,
    }
}

/// Scores of the 3x3 block around (x, y); non-corners and border pixels score 0
fn score_neighbourhood(img: &[u8], w: usize, h: usize, x: usize, y: usize, threshold: u8) -> [[f32; 3]; 3] {
    let mut scores = [[0.0f32; 3]; 3];
    for (r, row) in scores.iter_mut().enumerate() {
        for (c, s) in row.iter_mut().enumerate() {
            let (xx, yy) = (x + c, y + r);
            // xx, yy are offset by +1
            if xx < 4 || yy < 4 || xx + 3 > w || yy + 3 > h {
                continue;
            }
            *s = corner_score(img, w, xx - 1, yy - 1, threshold).unwrap_or(0.0);
        }
    }
    scores
}
