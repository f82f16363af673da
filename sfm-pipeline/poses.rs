use nalgebra::Point2;
use rand::Rng;
use sfm_core::{Intrinsics, Keypoint, Match};
use sfm_geometry::{RansacOptions, estimate_relative_pose};
use tracing::{debug, warn};

use crate::error::SfmError;
use crate::state::{PoseEdge, ReconstructionState};
use crate::summary::{PoseFailure, PoseSummary};

fn pixel(kp: &Keypoint) -> Point2<f64> {
    Point2::new(kp.x as f64, kp.y as f64)
}

/// Walks the pairs in order, chaining each recovered relative motion onto the
/// previous absolute pose. A pair that yields no motion leaves every later
/// image unposed, since no common frame links them to the origin.
pub(crate) fn estimate_pose_chain<R>(
    state: &mut ReconstructionState,
    intrinsics: &Intrinsics,
    opts: &RansacOptions,
    rng: &mut R,
) -> PoseSummary
where
    R: Rng + ?Sized,
{
    let mut summary = PoseSummary::default();
    state.poses.truncate(1);
    state.edges.clear();

    for pair in 0..state.num_pairs() {
        let edge = match (state.poses[pair].is_some(), state.matches(pair)) {
            (true, Some(matches)) => {
                let query = state.keypoints(pair).unwrap_or_default();
                let train = state.keypoints(pair + 1).unwrap_or_default();
                match estimate_edge(intrinsics, query, train, matches, opts, rng) {
                    Ok(edge) => Some(edge),
                    Err(reason) => {
                        let err = SfmError::PoseEstimationFailed { pair, reason: reason.clone() };
                        warn!(error = %err, "pose chain broken");
                        summary.failures.push(PoseFailure { pair, reason });
                        None
                    }
                }
            }
            _ => {
                summary.skipped.push(pair);
                None
            }
        };

        let pose = match (&edge, state.poses[pair]) {
            (Some(edge), Some(prev)) => {
                summary.inliers.push((pair, edge.inliers.len()));
                Some(prev.then(&edge.relative))
            }
            _ => None,
        };
        state.poses.push(pose);
        state.edges.push(edge);
    }

    state.poses.truncate(state.num_images().max(1));
    summary.posed = state.camera_poses().len();
    summary
}

fn estimate_edge<R>(
    intrinsics: &Intrinsics,
    query: &[Keypoint],
    train: &[Keypoint],
    matches: &[Match],
    opts: &RansacOptions,
    rng: &mut R,
) -> Result<PoseEdge, String>
where
    R: Rng + ?Sized,
{
    let mut pixels1 = Vec::with_capacity(matches.len());
    let mut pixels2 = Vec::with_capacity(matches.len());
    for m in matches {
        match (query.get(m.query_idx), train.get(m.train_idx)) {
            (Some(a), Some(b)) => {
                pixels1.push(pixel(a));
                pixels2.push(pixel(b));
            }
            _ => return Err(format!("match {}->{} out of range", m.query_idx, m.train_idx)),
        }
    }

    let estimate =
        estimate_relative_pose(intrinsics, &pixels1, &pixels2, opts, rng).map_err(|e| e.to_string())?;
    debug!(
        matches = matches.len(),
        inliers = estimate.inliers.len(),
        iterations = estimate.iterations,
        "edge estimated"
    );
    Ok(PoseEdge {
        relative: estimate.pose,
        inliers: estimate.inliers.iter().map(|&i| matches[i]).collect(),
    })
}
