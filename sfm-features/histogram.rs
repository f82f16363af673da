use std::f32::consts::TAU;

use rayon::prelude::*;
use sfm_core::{Descriptor, Keypoint};

use crate::utils::bilinear;

const GRID: usize = 4;
const SAMPLES: usize = 16;
const BINS: usize = 8;

/// Length of a gradient-histogram descriptor
pub const HISTOGRAM_DIM: usize = GRID * GRID * BINS;

/// Large single gradients are clipped to this after the first normalization
const CLIP: f32 = 0.2;

/// 4x4 spatial cells of 8-bin gradient orientation histograms, sampled on a
/// 16x16 grid rotated to the keypoint angle and scaled with its octave.
#[derive(Debug, Clone)]
pub struct HistogramGenerator {
    spacing: f32,
}

impl HistogramGenerator {
    pub fn new(patch_size: usize) -> Self {
        Self {
            spacing: patch_size as f32 / SAMPLES as f32,
        }
    }

    pub fn describe(&self, smoothed: &[f32], width: usize, height: usize, kps: &[Keypoint]) -> Vec<Descriptor> {
        kps.par_iter()
            .map(|kp| Descriptor::Histogram(self.describe_one(smoothed, width, height, kp)))
            .collect()
    }

    fn describe_one(&self, plane: &[f32], width: usize, height: usize, kp: &Keypoint) -> Vec<f32> {
        let (s, c) = kp.angle.sin_cos();
        let step = self.spacing * kp.scale;
        let half = (SAMPLES as f32 - 1.0) / 2.0;
        let sigma = SAMPLES as f32 / 2.0;
        let mut hist = vec![0.0f32; HISTOGRAM_DIM];

        for j in 0..SAMPLES {
            for i in 0..SAMPLES {
                let u = (i as f32 - half) * step;
                let v = (j as f32 - half) * step;
                let px = kp.x + c * u - s * v;
                let py = kp.y + s * u + c * v;

                let gx = bilinear(plane, width, height, px + step, py) - bilinear(plane, width, height, px - step, py);
                let gy = bilinear(plane, width, height, px, py + step) - bilinear(plane, width, height, px, py - step);
                // Gradient in the keypoint frame
                let gu = c * gx + s * gy;
                let gv = -s * gx + c * gy;
                let mag = gu.hypot(gv);
                if mag == 0.0 {
                    continue;
                }

                let theta = gv.atan2(gu).rem_euclid(TAU);
                let bin = ((theta / TAU * BINS as f32) as usize).min(BINS - 1);
                let du = i as f32 - half;
                let dv = j as f32 - half;
                let weight = (-(du * du + dv * dv) / (2.0 * sigma * sigma)).exp();
                let cell = (j / GRID) * GRID + i / GRID;
                hist[cell * BINS + bin] += weight * mag;
            }
        }

        normalize(&mut hist);
        for v in hist.iter_mut() {
            *v = v.min(CLIP);
        }
        normalize(&mut hist);
        hist
    }
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
