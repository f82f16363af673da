//! Two-view geometry for structure-from-motion.
//!
//! - [`ransac`]: generic robust fitting over an [`Estimator`]
//! - [`five_point`]: minimal essential matrix solver for calibrated views
//! - [`estimate_relative_pose`]: RANSAC over five-point hypotheses with
//!   cheirality-aware scoring, rejecting pairs without enough parallax
//! - [`TwoViewTriangulator`]: DLT triangulation with depth and reprojection
//!   checks
//!
//! Poses follow the world-to-camera convention of [`sfm_core::CameraPose`].

mod error;
mod essential;
mod pose;
mod ransac;
mod triangulation;

pub use error::{GeometryError, GeometryResult};
pub use essential::{decompose_essential, essential_from_pose, five_point, sampson_distance, skew};
pub use pose::{
    estimate_relative_pose, median_parallax, ray_depths, select_motion, Correspondence, MotionHypothesis,
    RelativePose, RelativePoseEstimator, MIN_CORRESPONDENCES, MIN_PARALLAX_DEGREES,
};
pub use ransac::{ransac, required_iterations, Estimator, RansacOptions, RansacResult};
pub use triangulation::{reprojection_error, triangulate_dlt, PointRejection, TwoViewTriangulator};
