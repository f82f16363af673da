//! Relative pose between two calibrated views.

use nalgebra::{Matrix3, Point2, Vector3};
use rand::Rng;
use sfm_core::{CameraPose, Intrinsics};
use tracing::debug;

use crate::error::{GeometryError, GeometryResult};
use crate::essential::{decompose_essential, five_point, sampson_distance};
use crate::ransac::{Estimator, RansacOptions, ransac};

/// Fewest correspondences accepted for a relative pose
pub const MIN_CORRESPONDENCES: usize = 8;

/// Median triangulation angle, in degrees, below which a pair is treated as
/// a pure rotation whose translation cannot be observed
pub const MIN_PARALLAX_DEGREES: f64 = 1.0;

/// Correspondence on the normalized image planes of both views
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub x1: Point2<f64>,
    pub x2: Point2<f64>,
}

/// Essential matrix hypothesis with the motion chosen for it
#[derive(Debug, Clone, PartialEq)]
pub struct MotionHypothesis {
    pub essential: Matrix3<f64>,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

/// Depths of a correspondence along both rays under `x2 = R x1 + t`, from the
/// midpoint of the closest approach. `None` for (near) parallel rays.
pub fn ray_depths(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    x1: &Point2<f64>,
    x2: &Point2<f64>,
) -> Option<(f64, f64)> {
    let a = rotation * x1.to_homogeneous();
    let b = x2.to_homogeneous();
    let (aa, bb, ab) = (a.dot(&a), b.dot(&b), a.dot(&b));
    let (at, bt) = (a.dot(translation), b.dot(translation));

    let det = aa * bb - ab * ab;
    if det <= 1e-12 * aa * bb {
        return None;
    }
    let d1 = (ab * bt - at * bb) / det;
    let d2 = (aa * bt - ab * at) / det;
    Some((d1, d2))
}

fn in_front(rotation: &Matrix3<f64>, translation: &Vector3<f64>, c: &Correspondence) -> bool {
    matches!(ray_depths(rotation, translation, &c.x1, &c.x2), Some((d1, d2)) if d1 > 0.0 && d2 > 0.0)
}

/// Median angle in degrees between the two viewing rays at each triangulated
/// correspondence. Correspondences without a point in front of both cameras
/// are left out; `None` when none remain.
pub fn median_parallax<'a, I>(
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    points: I,
) -> Option<f64>
where
    I: IntoIterator<Item = &'a Correspondence>,
{
    // Second camera centre in the first camera's frame
    let center = -(rotation.transpose() * translation);
    let mut angles: Vec<f64> = points
        .into_iter()
        .filter_map(|c| {
            let (d1, d2) = ray_depths(rotation, translation, &c.x1, &c.x2)?;
            if d1 <= 0.0 || d2 <= 0.0 {
                return None;
            }
            let point = c.x1.to_homogeneous() * d1;
            let (a, b) = (point, point - center);
            let cos = a.dot(&b) / (a.norm() * b.norm());
            Some(cos.clamp(-1.0, 1.0).acos().to_degrees())
        })
        .collect();
    if angles.is_empty() {
        return None;
    }
    angles.sort_by(f64::total_cmp);
    Some(angles[angles.len() / 2])
}

/// Picks the decomposition with the most correspondences in front of both
/// cameras. `None` when no candidate puts a strict majority in front.
pub fn select_motion<'a, I>(essential: &Matrix3<f64>, points: I) -> Option<MotionHypothesis>
where
    I: IntoIterator<Item = &'a Correspondence> + Clone,
{
    let candidates = decompose_essential(essential).ok()?;
    let total = points.clone().into_iter().count();

    let (best, count) = candidates
        .iter()
        .map(|(r, t)| (r, t, points.clone().into_iter().filter(|c| in_front(r, t, c)).count()))
        .max_by_key(|&(_, _, n)| n)
        .map(|(r, t, n)| ((*r, *t), n))?;

    if total == 0 || 2 * count <= total {
        return None;
    }
    Some(MotionHypothesis {
        essential: *essential,
        rotation: best.0,
        translation: best.1,
    })
}

/// Five-point hypotheses scored by Sampson distance in pixels. A
/// correspondence that triangulates behind either camera never counts as an
/// inlier, which separates the true motion from its planar twin.
pub struct RelativePoseEstimator {
    focal: f64,
}

impl RelativePoseEstimator {
    pub fn new(intrinsics: &Intrinsics) -> Self {
        Self { focal: intrinsics.mean_focal() }
    }
}

impl Estimator for RelativePoseEstimator {
    type Datum = Correspondence;
    type Model = MotionHypothesis;
    const MIN_SAMPLES: usize = 5;

    fn fit(&self, data: &[Correspondence], sample: &[usize]) -> Vec<MotionHypothesis> {
        let x1: Vec<Point2<f64>> = sample.iter().map(|&i| data[i].x1).collect();
        let x2: Vec<Point2<f64>> = sample.iter().map(|&i| data[i].x2).collect();
        let Ok(essentials) = five_point(&x1, &x2) else {
            return Vec::new();
        };
        essentials
            .iter()
            .filter_map(|e| select_motion(e, sample.iter().map(|&i| &data[i])))
            .collect()
    }

    fn residual(&self, model: &MotionHypothesis, datum: &Correspondence) -> f64 {
        if !in_front(&model.rotation, &model.translation, datum) {
            return f64::INFINITY;
        }
        sampson_distance(&model.essential, &datum.x1, &datum.x2) * self.focal
    }
}

/// Outcome of robust relative pose estimation
#[derive(Debug, Clone)]
pub struct RelativePose {
    /// Maps camera-1 coordinates to camera-2 coordinates; `|t| = 1`
    pub pose: CameraPose,
    pub essential: Matrix3<f64>,
    /// Indices into the input correspondences
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

/// Robust relative pose from pixel correspondences of two views sharing
/// `intrinsics`. Translation is recovered only up to scale.
pub fn estimate_relative_pose<R>(
    intrinsics: &Intrinsics,
    pixels1: &[Point2<f64>],
    pixels2: &[Point2<f64>],
    opts: &RansacOptions,
    rng: &mut R,
) -> GeometryResult<RelativePose>
where
    R: Rng + ?Sized,
{
    if pixels1.len() != pixels2.len() {
        return Err(GeometryError::LengthMismatch { left: pixels1.len(), right: pixels2.len() });
    }
    if pixels1.len() < MIN_CORRESPONDENCES {
        return Err(GeometryError::NotEnoughPoints {
            required: MIN_CORRESPONDENCES,
            found: pixels1.len(),
        });
    }

    let data: Vec<Correspondence> = pixels1
        .iter()
        .zip(pixels2.iter())
        .map(|(p, q)| Correspondence {
            x1: intrinsics.normalize(p),
            x2: intrinsics.normalize(q),
        })
        .collect();

    let opts = RansacOptions {
        min_inliers: opts.min_inliers.max(MIN_CORRESPONDENCES),
        ..opts.clone()
    };
    let estimator = RelativePoseEstimator::new(intrinsics);
    let best = ransac(&estimator, &data, &opts, rng)?;

    // Re-select the motion on the whole consensus set
    let motion = select_motion(&best.model.essential, best.inliers.iter().map(|&i| &data[i]))
        .ok_or(GeometryError::NoValidDecomposition)?;
    let inliers: Vec<usize> = (0..data.len())
        .filter(|&i| estimator.residual(&motion, &data[i]) <= opts.threshold)
        .collect();
    if inliers.len() < opts.min_inliers {
        return Err(GeometryError::InsufficientInliers {
            found: inliers.len(),
            required: opts.min_inliers,
        });
    }

    let parallax = median_parallax(&motion.rotation, &motion.translation, inliers.iter().map(|&i| &data[i]))
        .unwrap_or(0.0);
    if parallax < MIN_PARALLAX_DEGREES {
        return Err(GeometryError::InsufficientParallax {
            median: parallax,
            required: MIN_PARALLAX_DEGREES,
        });
    }

    debug!(
        parallax,
        inliers = inliers.len(),
        total = data.len(),
        iterations = best.iterations,
        "relative pose estimated"
    );

    Ok(RelativePose {
        pose: CameraPose::new(motion.rotation, motion.translation),
        essential: motion.essential,
        inliers,
        iterations: best.iterations,
    })
}
