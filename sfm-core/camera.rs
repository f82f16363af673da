use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Vector3};

use crate::error::{CoreError, CoreResult};

/// Pinhole intrinsics shared by every frame of a reconstruction.
///
/// No distortion model is carried; inputs are assumed undistorted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
}

impl Intrinsics {
    /// Creates intrinsics, rejecting non-positive or non-finite focal lengths
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> CoreResult<Self> {
        if !(fx.is_finite() && fx > 0.0) || !(fy.is_finite() && fy > 0.0) {
            return Err(CoreError::InvalidFocalLength { fx, fy });
        }
        if !cx.is_finite() || !cy.is_finite() {
            return Err(CoreError::InvalidPrincipalPoint { cx, cy });
        }
        Ok(Self { fx, fy, cx, cy })
    }

    /// Reads the four parameters back out of a calibration matrix
    pub fn from_matrix(k: &Matrix3<f64>) -> CoreResult<Self> {
        let zero_skew = k[(0, 1)] == 0.0;
        let lower_zero = k[(1, 0)] == 0.0 && k[(2, 0)] == 0.0 && k[(2, 1)] == 0.0;
        if !zero_skew || !lower_zero || k[(2, 2)] != 1.0 {
            return Err(CoreError::NotPinhole);
        }
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    pub fn fx(&self) -> f64 {
        self.fx
    }

    pub fn fy(&self) -> f64 {
        self.fy
    }

    pub fn cx(&self) -> f64 {
        self.cx
    }

    pub fn cy(&self) -> f64 {
        self.cy
    }

    /// The 3x3 calibration matrix `K`
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx,
            0.0, self.fy, self.cy,
            0.0, 0.0, 1.0,
        )
    }

    /// Closed-form `K^-1`
    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            1.0 / self.fx, 0.0, -self.cx / self.fx,
            0.0, 1.0 / self.fy, -self.cy / self.fy,
            0.0, 0.0, 1.0,
        )
    }

    /// Geometric mean of the focal lengths, used to express normalized-plane
    /// distances in pixels
    pub fn mean_focal(&self) -> f64 {
        (self.fx * self.fy).sqrt()
    }

    /// Pixel -> normalized image plane (z = 1)
    pub fn normalize(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    /// Normalized image plane -> pixel
    pub fn denormalize(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::new(p.x * self.fx + self.cx, p.y * self.fy + self.cy)
    }

    /// Projects a camera-frame point; `None` when it is not in front of the camera
    pub fn project(&self, p_cam: &Point3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= f64::EPSILON {
            return None;
        }
        Some(self.denormalize(&Point2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z)))
    }
}

/// World-to-camera rigid transform: `x_cam = R * x_world + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

impl CameraPose {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self { rotation, translation }
    }

    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Chains a transform expressed relative to this camera onto this pose.
    ///
    /// If `self` maps world to camera k-1 and `relative` maps camera k-1 to
    /// camera k, the result maps world to camera k.
    pub fn then(&self, relative: &CameraPose) -> CameraPose {
        CameraPose {
            rotation: relative.rotation * self.rotation,
            translation: relative.rotation * self.translation + relative.translation,
        }
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    /// Depth (camera-frame z) of a world point
    pub fn depth_of(&self, p: &Point3<f64>) -> f64 {
        self.transform_point(p).z
    }

    /// Camera centre in world coordinates
    pub fn center(&self) -> Point3<f64> {
        Point3::from(-(self.rotation.transpose() * self.translation))
    }

    /// `[R | t]`
    pub fn matrix3x4(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.set_column(3, &self.translation);
        m
    }

    /// Camera projection matrix `K [R | t]`
    pub fn projection(&self, intrinsics: &Intrinsics) -> Matrix3x4<f64> {
        intrinsics.matrix() * self.matrix3x4()
    }

    /// Projects a world point to pixels through this pose
    pub fn project(&self, intrinsics: &Intrinsics, p: &Point3<f64>) -> Option<Point2<f64>> {
        intrinsics.project(&self.transform_point(p))
    }
}
