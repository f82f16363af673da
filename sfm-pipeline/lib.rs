//! Incremental two-view structure-from-motion.
//!
//! [`Reconstruction`] drives an ordered image sequence through
//! Load → Detect → Match → EstimatePoses → Triangulate → Export. Each stage
//! appends to a [`ReconstructionState`] and must run exactly once, in order.
//!
//! Each pair's translation is recovered with unit norm, so the trajectory
//! and cloud carry an unresolved scale per pair that drifts along the chain.
//!
//! ```no_run
//! use sfm_pipeline::{collect_image_paths, Reconstruction, SfmConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sfm = Reconstruction::new(SfmConfig::default())?;
//! sfm.load_images(&collect_image_paths("frames")?)?;
//! println!("{}", sfm.detect_features()?);
//! println!("{}", sfm.match_features()?);
//! println!("{}", sfm.estimate_poses()?);
//! println!("{}", sfm.triangulate()?);
//! sfm.export("cloud.ply")?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod export;
mod loader;
mod matcher;
mod poses;
mod state;
mod summary;
mod triangulator;

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sfm_core::{CameraPose, Image, Intrinsics, Keypoint, Match, Point3D};
use sfm_features::{BackendBuilder, FeatureBackend};
use tracing::{debug, info, warn};

pub use config::{ExportConfig, IntrinsicsConfig, MatchingConfig, RansacConfig, SfmConfig, TriangulationConfig};
pub use error::{SfmError, SfmResult};
pub use export::{PlyFormat, PointCloudExporter, DEFAULT_COLOR};
pub use loader::{collect_image_paths, load_image, load_images};
pub use matcher::{PairMatcher, PairMatches};
pub use state::{PoseEdge, ReconstructionState, Stage};
pub use summary::{DetectSummary, InsufficientPair, MatchSummary, PoseFailure, PoseSummary, TriangulationSummary};

pub use sfm_core;
pub use sfm_features;
pub use sfm_geometry;

/// Stage-gated reconstruction over one ordered image set
pub struct Reconstruction {
    config: SfmConfig,
    intrinsics: Intrinsics,
    backend: Box<dyn FeatureBackend>,
    state: ReconstructionState,
}

impl Reconstruction {
    /// Validates `config` and builds the feature backend it names
    pub fn new(config: SfmConfig) -> SfmResult<Self> {
        config.validate()?;
        let backend = BackendBuilder::from_config(config.features.clone()).build()?;
        Self::assemble(config, backend)
    }

    /// Uses a caller-supplied backend. The whole `config` is still validated
    /// even though `config.features` goes unused.
    pub fn with_backend(config: SfmConfig, backend: Box<dyn FeatureBackend>) -> SfmResult<Self> {
        config.validate()?;
        Self::assemble(config, backend)
    }

    fn assemble(config: SfmConfig, backend: Box<dyn FeatureBackend>) -> SfmResult<Self> {
        let intrinsics = config.intrinsics.to_intrinsics()?;
        debug!(config = %config.summary(), backend = %backend.kind(), "reconstruction created");
        Ok(Self {
            config,
            intrinsics,
            backend,
            state: ReconstructionState::new(),
        })
    }

    pub fn config(&self) -> &SfmConfig {
        &self.config
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn state(&self) -> &ReconstructionState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    fn enter(&self, expected: Stage) -> SfmResult<()> {
        if self.state.stage != expected {
            return Err(SfmError::StageOrder {
                expected,
                actual: self.state.stage,
            });
        }
        Ok(())
    }

    /// Decodes `paths` in order and takes ownership of the images
    pub fn load_images<P: AsRef<Path>>(&mut self, paths: &[P]) -> SfmResult<usize> {
        self.enter(Stage::Empty)?;
        if paths.is_empty() {
            return Err(SfmError::NoImages);
        }
        let images = load_images(paths)?;
        self.add_images(images)
    }

    /// Takes already decoded images in sequence order
    pub fn add_images(&mut self, images: Vec<Image>) -> SfmResult<usize> {
        self.enter(Stage::Empty)?;
        if images.is_empty() {
            return Err(SfmError::NoImages);
        }
        self.state.images = images;
        self.state.stage = Stage::Loaded;
        info!(images = self.state.images.len(), "images loaded");
        Ok(self.state.images.len())
    }

    /// Runs the backend over every image. Images without keypoints are
    /// recorded as skipped and take no further part.
    pub fn detect_features(&mut self) -> SfmResult<DetectSummary> {
        self.enter(Stage::Loaded)?;
        let mut summary = DetectSummary::default();
        let mut features = Vec::with_capacity(self.state.images.len());

        for (index, image) in self.state.images.iter().enumerate() {
            let set = match self.backend.detect_and_describe(image) {
                Ok(set) if !set.is_empty() && set.keypoints.len() == set.descriptors.len() => Some(set),
                Ok(_) => None,
                Err(e) => {
                    debug!(index, error = %e, "backend failed");
                    None
                }
            };
            match &set {
                Some(set) => {
                    debug!(index, keypoints = set.len(), "features detected");
                    summary.keypoints.push(set.len());
                }
                None => {
                    warn!(error = %SfmError::FeatureDetectionFailed { index }, "skipping image");
                    summary.keypoints.push(0);
                    summary.skipped.push(index);
                }
            }
            features.push(set);
        }

        self.state.features = features;
        self.state.stage = Stage::Detected;
        info!(
            keypoints = summary.total_keypoints(),
            skipped = summary.skipped.len(),
            "feature detection complete"
        );
        Ok(summary)
    }

    /// Matches every consecutive pair whose images both have features
    pub fn match_features(&mut self) -> SfmResult<MatchSummary> {
        self.enter(Stage::Detected)?;
        let matcher = PairMatcher::new(&self.config.matching);
        let mut summary = MatchSummary::default();
        let mut all = Vec::with_capacity(self.state.num_pairs());

        for pair in 0..self.state.num_pairs() {
            let (Some(query), Some(train)) = (self.state.features(pair), self.state.features(pair + 1)) else {
                debug!(pair, "pair skipped, image without features");
                summary.matches.push(0);
                summary.skipped.push(pair);
                all.push(None);
                continue;
            };

            match matcher.match_pair(self.backend.as_ref(), &query.descriptors, &train.descriptors) {
                PairMatches::Accepted(matches) => {
                    debug!(pair, matches = matches.len(), "pair matched");
                    summary.matches.push(matches.len());
                    all.push(Some(matches));
                }
                PairMatches::Insufficient { found } => {
                    let err = SfmError::InsufficientMatches {
                        pair,
                        found,
                        required: matcher.min_matches(),
                    };
                    warn!(error = %err, "pair dropped");
                    summary.matches.push(0);
                    summary.insufficient.push(InsufficientPair { pair, found });
                    all.push(None);
                }
            }
        }

        self.state.matches = all;
        self.state.stage = Stage::Matched;
        info!(
            matches = summary.total_matches(),
            pairs = summary.matches.len(),
            "matching complete"
        );
        Ok(summary)
    }

    /// Pose chain with the RANSAC seed from the configuration, or an
    /// entropy-seeded generator when none is set
    pub fn estimate_poses(&mut self) -> SfmResult<PoseSummary> {
        match self.config.ransac.seed {
            Some(seed) => self.estimate_poses_with_rng(&mut StdRng::seed_from_u64(seed)),
            None => self.estimate_poses_with_rng(&mut rand::rng()),
        }
    }

    pub fn estimate_poses_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SfmResult<PoseSummary> {
        self.enter(Stage::Matched)?;
        let opts = self.config.ransac.options();
        let summary = poses::estimate_pose_chain(&mut self.state, &self.intrinsics, &opts, rng);
        self.state.stage = Stage::PosesEstimated;
        info!(
            posed = summary.posed,
            failed = summary.failures.len(),
            "pose estimation complete"
        );
        Ok(summary)
    }

    /// Adds a point for every inlier of every posed edge that lands in front
    /// of both cameras within the reprojection tolerance
    pub fn triangulate(&mut self) -> SfmResult<TriangulationSummary> {
        self.enter(Stage::PosesEstimated)?;
        let max_error = self.config.triangulation.max_reprojection_error;
        let summary = triangulator::triangulate_edges(&mut self.state, &self.intrinsics, max_error);
        self.state.stage = Stage::Triangulated;
        info!(
            points = summary.total_points(),
            rejected = summary.total_rejected(),
            "triangulation complete"
        );
        Ok(summary)
    }

    /// Writes the cloud as PLY in the configured format. Returns the number
    /// of vertices written.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> SfmResult<usize> {
        self.enter(Stage::Triangulated)?;
        let path = path.as_ref();
        PointCloudExporter::new(self.config.export.format).export(path, &self.state.cloud)?;
        info!(path = %path.display(), points = self.state.cloud.len(), "point cloud exported");
        Ok(self.state.cloud.len())
    }

    pub fn cloud(&self) -> &[Point3D] {
        self.state.cloud()
    }

    pub fn colors(&self) -> Vec<[u8; 3]> {
        self.state.colors()
    }

    pub fn camera_poses(&self) -> Vec<CameraPose> {
        self.state.camera_poses()
    }

    pub fn pose(&self, index: usize) -> Option<&CameraPose> {
        self.state.pose(index)
    }

    pub fn keypoints(&self, index: usize) -> Option<&[Keypoint]> {
        self.state.keypoints(index)
    }

    pub fn matches(&self, pair: usize) -> Option<&[Match]> {
        self.state.matches(pair)
    }
}
