use nalgebra::Point2;
use sfm_core::{Intrinsics, Point3D};
use sfm_geometry::TwoViewTriangulator;
use tracing::{debug, info};

use crate::state::ReconstructionState;
use crate::summary::TriangulationSummary;

/// Lifts the inlier matches of every posed edge into the cloud, colored from
/// the first image of the pair.
pub(crate) fn triangulate_edges(
    state: &mut ReconstructionState,
    intrinsics: &Intrinsics,
    max_error: f64,
) -> TriangulationSummary {
    let mut summary = TriangulationSummary::default();
    let mut cloud = Vec::new();

    for pair in 0..state.num_pairs() {
        let (Some(edge), Some(first), Some(second)) =
            (state.edge(pair), state.pose(pair), state.pose(pair + 1))
        else {
            continue;
        };
        let (Some(query), Some(train)) = (state.keypoints(pair), state.keypoints(pair + 1)) else {
            continue;
        };
        let image = &state.images[pair];
        let triangulator = TwoViewTriangulator::new(intrinsics, first, second, max_error);

        let before = cloud.len();
        for m in &edge.inliers {
            let (a, b) = (&query[m.query_idx], &train[m.train_idx]);
            let x1 = Point2::new(a.x as f64, a.y as f64);
            let x2 = Point2::new(b.x as f64, b.y as f64);
            match triangulator.triangulate(&x1, &x2) {
                Ok(position) => cloud.push(Point3D::new(position, image.color_at(a.x, a.y))),
                Err(rejection) => *summary.rejected.entry(rejection).or_default() += 1,
            }
        }

        let added = cloud.len() - before;
        summary.points.push((pair, added));
        if added == 0 {
            info!(pair, "triangulation empty");
            summary.empty_pairs.push(pair);
        } else {
            debug!(pair, added, inliers = edge.inliers.len(), "triangulated pair");
        }
    }

    state.cloud.extend(cloud);
    summary
}
