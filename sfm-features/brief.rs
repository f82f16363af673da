use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use sfm_core::{Descriptor, Keypoint, BINARY_DESCRIPTOR_BYTES};

use crate::utils::bilinear;

const PAIR_COUNT: usize = BINARY_DESCRIPTOR_BYTES * 8;

/// Fixed so descriptors from separate runs and images stay comparable
const PATTERN_SEED: u64 = 0x0b1e_f5a5;

/// Steered BRIEF: 256 intensity comparisons rotated by the keypoint angle
#[derive(Debug, Clone)]
pub struct BriefGenerator {
    pattern: Vec<[f32; 4]>,
}

impl BriefGenerator {
    /// Draws the sampling pattern uniformly from the patch
    pub fn new(patch_size: usize) -> Self {
        let half = (patch_size / 2) as f32;
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let pattern = (0..PAIR_COUNT)
            .map(|_| {
                [
                    rng.random_range(-half..=half),
                    rng.random_range(-half..=half),
                    rng.random_range(-half..=half),
                    rng.random_range(-half..=half),
                ]
            })
            .collect();
        Self { pattern }
    }

    /// Describes each keypoint on a pre-smoothed level-0 plane
    pub fn describe(&self, smoothed: &[f32], width: usize, height: usize, kps: &[Keypoint]) -> Vec<Descriptor> {
        kps.par_iter()
            .map(|kp| Descriptor::Binary(self.describe_one(smoothed, width, height, kp)))
            .collect()
    }

    fn describe_one(&self, plane: &[f32], width: usize, height: usize, kp: &Keypoint) -> [u8; BINARY_DESCRIPTOR_BYTES] {
        let (s, c) = kp.angle.sin_cos();
        let (s, c) = (s * kp.scale, c * kp.scale);
        let mut d = [0u8; BINARY_DESCRIPTOR_BYTES];

        for (i, &[x1, y1, x2, y2]) in self.pattern.iter().enumerate() {
            let a = bilinear(plane, width, height, kp.x + c * x1 - s * y1, kp.y + s * x1 + c * y1);
            let b = bilinear(plane, width, height, kp.x + c * x2 - s * y2, kp.y + s * x2 + c * y2);
            d[i / 8] |= ((a < b) as u8) << (i % 8);
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_plane(w: usize, h: usize) -> Vec<f32> {
        (0..w * h)
            .map(|i| {
                let (x, y) = ((i % w) as f32, (i / w) as f32);
                (x * 3.0 + (y * 0.7).sin() * 40.0 + (x * 0.3).cos() * 25.0) % 255.0
            })
            .collect()
    }

    #[test]
    fn test_pattern_is_deterministic() {
        let a = BriefGenerator::new(31);
        let b = BriefGenerator::new(31);
        assert_eq!(a.pattern, b.pattern);
        assert_eq!(a.pattern.len(), 256);
        assert!(a.pattern.iter().flatten().all(|v| v.abs() <= 15.0));
    }

    #[test]
    fn test_same_point_same_descriptor() {
        let (w, h) = (64, 64);
        let plane = gradient_plane(w, h);
        let gen = BriefGenerator::new(31);
        let kp = Keypoint::new(32.0, 32.0);
        let d = gen.describe(&plane, w, h, &[kp, kp]);
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].hamming(&d[1]), Some(0));
    }

    #[test]
    fn test_different_points_differ() {
        let (w, h) = (64, 64);
        let plane = gradient_plane(w, h);
        let gen = BriefGenerator::new(31);
        let d = gen.describe(&plane, w, h, &[Keypoint::new(20.0, 20.0), Keypoint::new(44.0, 40.0)]);
        assert!(d[0].hamming(&d[1]).unwrap() > 0);
    }

    #[test]
    fn test_uniform_patch_is_all_zero() {
        let plane = vec![90.0f32; 32 * 32];
        let d = BriefGenerator::new(15).describe(&plane, 32, 32, &[Keypoint::new(16.0, 16.0)]);
        assert_eq!(d[0], Descriptor::Binary([0u8; BINARY_DESCRIPTOR_BYTES]));
    }
}
