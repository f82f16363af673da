//! Linear two-view triangulation with depth and reprojection checks.

use std::fmt;

use nalgebra::{Matrix3x4, Matrix4, Point2, Point3};
use sfm_core::{CameraPose, Intrinsics};

/// Why a correspondence produced no point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointRejection {
    /// Rays are parallel or the solution lies at infinity
    Degenerate,
    /// Non-positive depth in at least one camera
    BehindCamera,
    /// Reprojection error above tolerance in at least one view
    Reprojection,
}

impl fmt::Display for PointRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointRejection::Degenerate => write!(f, "degenerate"),
            PointRejection::BehindCamera => write!(f, "behind camera"),
            PointRejection::Reprojection => write!(f, "reprojection"),
        }
    }
}

/// Homogeneous DLT solution for one correspondence given two 3x4 projection
/// matrices. `None` when the point is at infinity.
pub fn triangulate_dlt(
    p1: &Matrix3x4<f64>,
    p2: &Matrix3x4<f64>,
    x1: &Point2<f64>,
    x2: &Point2<f64>,
) -> Option<Point3<f64>> {
    let mut a = Matrix4::zeros();
    a.set_row(0, &(p1.row(2) * x1.x - p1.row(0)));
    a.set_row(1, &(p1.row(2) * x1.y - p1.row(1)));
    a.set_row(2, &(p2.row(2) * x2.x - p2.row(0)));
    a.set_row(3, &(p2.row(2) * x2.y - p2.row(1)));

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (smallest, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|(_, s), (_, t)| s.total_cmp(t))?;
    let h = v_t.row(smallest);

    let w = h[3];
    if !w.is_finite() || w.abs() < 1e-12 {
        return None;
    }
    let p = Point3::new(h[0] / w, h[1] / w, h[2] / w);
    p.coords.iter().all(|c| c.is_finite()).then_some(p)
}

/// Pixel distance between `observed` and the projection of `point`
pub fn reprojection_error(
    intrinsics: &Intrinsics,
    pose: &CameraPose,
    point: &Point3<f64>,
    observed: &Point2<f64>,
) -> Option<f64> {
    pose.project(intrinsics, point).map(|p| (p - observed).norm())
}

/// Triangulates correspondences between two posed views sharing intrinsics,
/// keeping only points in front of both cameras that reproject within
/// tolerance.
#[derive(Debug, Clone)]
pub struct TwoViewTriangulator {
    intrinsics: Intrinsics,
    first: CameraPose,
    second: CameraPose,
    p1: Matrix3x4<f64>,
    p2: Matrix3x4<f64>,
    max_error: f64,
}

impl TwoViewTriangulator {
    pub fn new(intrinsics: &Intrinsics, first: &CameraPose, second: &CameraPose, max_error: f64) -> Self {
        Self {
            intrinsics: *intrinsics,
            first: *first,
            second: *second,
            p1: first.projection(intrinsics),
            p2: second.projection(intrinsics),
            max_error,
        }
    }

    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    pub fn triangulate(&self, x1: &Point2<f64>, x2: &Point2<f64>) -> Result<Point3<f64>, PointRejection> {
        let point = triangulate_dlt(&self.p1, &self.p2, x1, x2).ok_or(PointRejection::Degenerate)?;

        if self.first.depth_of(&point) <= 0.0 || self.second.depth_of(&point) <= 0.0 {
            return Err(PointRejection::BehindCamera);
        }

        for (pose, observed) in [(&self.first, x1), (&self.second, x2)] {
            match reprojection_error(&self.intrinsics, pose, &point, observed) {
                Some(err) if err <= self.max_error => {}
                _ => return Err(PointRejection::Reprojection),
            }
        }
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};
    use proptest::prelude::*;

    fn intrinsics() -> Intrinsics {
        Intrinsics::new(800.0, 800.0, 320.0, 240.0).unwrap()
    }

    fn second_pose() -> CameraPose {
        CameraPose::new(
            Rotation3::from_euler_angles(0.01, -0.1, 0.0).into_inner(),
            Vector3::new(-1.0, 0.0, 0.05),
        )
    }

    #[test]
    fn test_recovers_known_point() {
        let k = intrinsics();
        let (c1, c2) = (CameraPose::identity(), second_pose());
        let truth = Point3::new(0.4, -0.3, 5.0);
        let x1 = c1.project(&k, &truth).unwrap();
        let x2 = c2.project(&k, &truth).unwrap();

        let tri = TwoViewTriangulator::new(&k, &c1, &c2, 4.0);
        let p = tri.triangulate(&x1, &x2).unwrap();
        assert!((p - truth).norm() < 1e-6);
        assert!(reprojection_error(&k, &c2, &p, &x2).unwrap() < 1e-6);
    }

    #[test]
    fn test_rejects_point_behind_cameras() {
        let k = intrinsics();
        let (c1, c2) = (CameraPose::identity(), second_pose());
        let tri = TwoViewTriangulator::new(&k, &c1, &c2, 4.0);

        // Both rays pass through a point behind the cameras
        let x1 = Point2::new(320.0, 240.0);
        let truth = Point3::new(0.0, 0.0, -5.0);
        let p_cam = c2.transform_point(&truth);
        let x2 = Point2::new(800.0 * p_cam.x / p_cam.z + 320.0, 800.0 * p_cam.y / p_cam.z + 240.0);
        assert_eq!(tri.triangulate(&x1, &x2), Err(PointRejection::BehindCamera));
    }

    #[test]
    fn test_rejects_inconsistent_observations() {
        let k = intrinsics();
        let (c1, c2) = (CameraPose::identity(), second_pose());
        let truth = Point3::new(0.2, 0.1, 6.0);
        let x1 = c1.project(&k, &truth).unwrap();
        let mut x2 = c2.project(&k, &truth).unwrap();
        // Off the epipolar line by 30 px
        x2.y += 30.0;

        let tri = TwoViewTriangulator::new(&k, &c1, &c2, 4.0);
        assert_eq!(tri.triangulate(&x1, &x2), Err(PointRejection::Reprojection));
    }

    proptest! {
        #[test]
        fn prop_synthetic_two_view_recovery(
            px in -2.0f64..2.0,
            py in -1.5f64..1.5,
            pz in 3.0f64..20.0,
            tx in 0.3f64..1.5,
            ty in -0.3f64..0.3,
            yaw in -0.15f64..0.15,
        ) {
            let k = intrinsics();
            let c1 = CameraPose::identity();
            let c2 = CameraPose::new(
                Rotation3::from_euler_angles(0.0, yaw, 0.0).into_inner(),
                Vector3::new(-tx, ty, 0.0),
            );
            let truth = Point3::new(px, py, pz);
            let x1 = c1.project(&k, &truth).unwrap();
            let x2 = c2.project(&k, &truth).unwrap();

            let tri = TwoViewTriangulator::new(&k, &c1, &c2, 4.0);
            let p = tri.triangulate(&x1, &x2).unwrap();
            prop_assert!(c1.depth_of(&p) > 0.0);
            prop_assert!(c2.depth_of(&p) > 0.0);
            prop_assert!(reprojection_error(&k, &c1, &p, &x1).unwrap() <= 4.0);
            prop_assert!(reprojection_error(&k, &c2, &p, &x2).unwrap() <= 4.0);
            prop_assert!((p - truth).norm() < 1e-5 * pz);
        }
    }
}
