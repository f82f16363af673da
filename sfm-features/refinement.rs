use std::collections::HashMap;

use crate::types::ScoredKeypoint;

/// Subpixel refinement, orientation and non-maximum suppression
pub struct KeypointRefinement;

impl KeypointRefinement {
    /// Offset of the peak of a quadratic fitted to a 3x3 score neighbourhood.
    ///
    /// `scores[row][col]` is centred on the integer corner. Returns (0, 0) when
    /// the surface is not a proper maximum.
    pub fn subpixel_offset(scores: &[[f32; 3]; 3]) -> (f32, f32) {
        let dx = (scores[1][2] - scores[1][0]) / 2.0;
        let dy = (scores[2][1] - scores[0][1]) / 2.0;
        let dxx = scores[1][2] - 2.0 * scores[1][1] + scores[1][0];
        let dyy = scores[2][1] - 2.0 * scores[1][1] + scores[0][1];
        let dxy = (scores[2][2] - scores[2][0] - scores[0][2] + scores[0][0]) / 4.0;

        let det = dxx * dyy - dxy * dxy;
        if det <= 1e-6 || dxx >= 0.0 {
            return (0.0, 0.0);
        }

        // Newton step -H^-1 g
        let offset_x = -(dyy * dx - dxy * dy) / det;
        let offset_y = -(dxx * dy - dxy * dx) / det;
        (offset_x.clamp(-0.5, 0.5), offset_y.clamp(-0.5, 0.5))
    }

    /// Orientation by intensity centroid over a disc of `radius` pixels
    pub fn compute_orientation(gray: &[u8], width: usize, height: usize, x: usize, y: usize, radius: i32) -> f32 {
        let (cx, cy) = (x as i32, y as i32);
        let r2 = radius * radius;
        let mut m10 = 0i64;
        let mut m01 = 0i64;

        for dy in -radius..=radius {
            let yy = cy + dy;
            if yy < 0 || yy >= height as i32 {
                continue;
            }
            let row = yy as usize * width;
            for dx in -radius..=radius {
                let xx = cx + dx;
                if dx * dx + dy * dy > r2 || xx < 0 || xx >= width as i32 {
                    continue;
                }
                let val = gray[row + xx as usize] as i64;
                m10 += dx as i64 * val;
                m01 += dy as i64 * val;
            }
        }

        if m10 == 0 && m01 == 0 {
            0.0
        } else {
            (m01 as f32).atan2(m10 as f32)
        }
    }

    /// Greedy suppression: strongest first, dropping anything closer than
    /// `min_distance` to an already accepted keypoint
    pub fn non_maximum_suppression(keypoints: &[ScoredKeypoint], min_distance: f32) -> Vec<ScoredKeypoint> {
        let mut sorted = keypoints.to_vec();
        sorted.sort_by(|a, b| b.response.total_cmp(&a.response));
        if min_distance <= 0.0 {
            return sorted;
        }

        let cell = min_distance;
        let min_distance_sq = min_distance * min_distance;
        let mut grid: HashMap<(i32, i32), Vec<(f32, f32)>> = HashMap::new();
        let mut accepted = Vec::new();

        for candidate in sorted {
            let (x, y) = (candidate.keypoint.x, candidate.keypoint.y);
            let key = ((x / cell).floor() as i32, (y / cell).floor() as i32);

            let crowded = (-1..=1).any(|gy| {
                (-1..=1).any(|gx| {
                    grid.get(&(key.0 + gx, key.1 + gy)).is_some_and(|pts| {
                        pts.iter()
                            .any(|&(px, py)| (x - px) * (x - px) + (y - py) * (y - py) < min_distance_sq)
                    })
                })
            });

            if !crowded {
                grid.entry(key).or_default().push((x, y));
                accepted.push(candidate);
            }
        }

        accepted
    }
}
