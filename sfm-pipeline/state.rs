//! The ledger every stage appends to.

use std::fmt;

use sfm_core::{CameraPose, Image, Keypoint, Match, Point3D};
use sfm_features::FeatureSet;

use crate::export::DEFAULT_COLOR;

/// Last completed pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Empty,
    Loaded,
    Detected,
    Matched,
    PosesEstimated,
    Triangulated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Empty => "empty",
            Stage::Loaded => "load",
            Stage::Detected => "detect",
            Stage::Matched => "match",
            Stage::PosesEstimated => "pose estimation",
            Stage::Triangulated => "triangulation",
        };
        f.write_str(name)
    }
}

/// Relative motion between images `pair` and `pair + 1`, with the matches
/// consistent with it
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEdge {
    pub relative: CameraPose,
    pub inliers: Vec<Match>,
}

/// Images, per-image features, per-pair matches and edges, the pose chain
/// and the point cloud. Pair `i` always joins images `i` and `i + 1`.
#[derive(Debug, Clone)]
pub struct ReconstructionState {
    pub(crate) stage: Stage,
    pub(crate) images: Vec<Image>,
    /// `None` for images the backend produced nothing for
    pub(crate) features: Vec<Option<FeatureSet>>,
    /// `None` for skipped or under-matched pairs
    pub(crate) matches: Vec<Option<Vec<Match>>>,
    pub(crate) edges: Vec<Option<PoseEdge>>,
    /// World-to-camera poses; slot 0 is the world origin
    pub(crate) poses: Vec<Option<CameraPose>>,
    pub(crate) cloud: Vec<Point3D>,
}

impl Default for ReconstructionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconstructionState {
    pub fn new() -> Self {
        Self {
            stage: Stage::Empty,
            images: Vec::new(),
            features: Vec::new(),
            matches: Vec::new(),
            edges: Vec::new(),
            poses: vec![Some(CameraPose::identity())],
            cloud: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    /// Number of consecutive pairs
    pub fn num_pairs(&self) -> usize {
        self.images.len().saturating_sub(1)
    }

    pub fn features(&self, index: usize) -> Option<&FeatureSet> {
        self.features.get(index)?.as_ref()
    }

    pub fn keypoints(&self, index: usize) -> Option<&[Keypoint]> {
        self.features(index).map(|f| f.keypoints.as_slice())
    }

    pub fn matches(&self, pair: usize) -> Option<&[Match]> {
        self.matches.get(pair)?.as_deref()
    }

    pub fn edge(&self, pair: usize) -> Option<&PoseEdge> {
        self.edges.get(pair)?.as_ref()
    }

    /// Absolute pose of image `index`, if the chain reached it
    pub fn pose(&self, index: usize) -> Option<&CameraPose> {
        if index >= self.images.len().max(1) {
            return None;
        }
        self.poses.get(index)?.as_ref()
    }

    /// Established poses in image order; never more than the image count
    pub fn camera_poses(&self) -> Vec<CameraPose> {
        self.poses.iter().take(self.images.len()).flatten().copied().collect()
    }

    pub fn cloud(&self) -> &[Point3D] {
        &self.cloud
    }

    /// Per-point colors, white where none was sampled
    pub fn colors(&self) -> Vec<[u8; 3]> {
        self.cloud.iter().map(|p| p.color.unwrap_or(DEFAULT_COLOR)).collect()
    }
}
