//! Feature backends for structure-from-motion.
//!
//! Both backends share the multi-scale FAST-9 detector and differ only in
//! the descriptor attached to each keypoint:
//!
//! - [`BinaryBackend`]: steered BRIEF, 256 bits, Hamming distance
//! - [`HistogramBackend`]: 4x4x8 gradient orientation histograms, L2 distance
//!
//! ```no_run
//! use sfm_core::Image;
//! use sfm_features::{BackendBuilder, DescriptorKind, FeatureBackend};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = Image::from_gray(64, 64, vec![0; 64 * 64])?;
//! let backend = BackendBuilder::new()
//!     .descriptor(DescriptorKind::Binary)
//!     .preset_fast()
//!     .build()?;
//! let features = backend.detect_and_describe(&image)?;
//! println!("{} keypoints", features.len());
//! # Ok(())
//! # }
//! ```

mod brief;
mod builder;
mod config;
mod detector;
mod error;
mod histogram;
mod pyramid;
mod refinement;
mod types;
mod utils;

use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use rayon::{ThreadPool, ThreadPoolBuilder};
use sfm_core::{Descriptor, Image, Keypoint};
use tracing::debug;

pub use brief::BriefGenerator;
pub use builder::BackendBuilder;
pub use config::FeatureConfig;
pub use detector::{corner_score, FastDetector};
pub use error::{FeatureError, FeatureResult};
pub use histogram::{HistogramGenerator, HISTOGRAM_DIM};
pub use pyramid::ImagePyramid;
pub use refinement::KeypointRefinement;
pub use types::{ScaleLevel, ScoredKeypoint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smoothing applied before sampling descriptors
const DESCRIPTOR_BLUR_SIGMA: f32 = 1.6;

/// Interchangeable descriptor algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DescriptorKind {
    #[default]
    GradientHistogram,
    Binary,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::GradientHistogram => write!(f, "gradient-histogram"),
            DescriptorKind::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for DescriptorKind {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gradient-histogram" | "histogram" | "sift" => Ok(DescriptorKind::GradientHistogram),
            "binary" | "orb" | "brief" => Ok(DescriptorKind::Binary),
            other => Err(FeatureError::Config(format!("unknown descriptor kind '{}'", other))),
        }
    }
}

/// Keypoints and their descriptors, index-aligned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Boundary between the reconstruction pipeline and feature extraction
pub trait FeatureBackend {
    fn kind(&self) -> DescriptorKind;

    /// Detect keypoints and describe them. An image with no keypoints is
    /// `FeatureError::NoKeypoints`.
    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet>;

    /// Distance between two descriptors produced by this backend; infinite
    /// for descriptors of another kind
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32;
}

/// FAST corners with steered BRIEF descriptors
pub struct BinaryBackend {
    detector: FastDetector,
    brief: BriefGenerator,
    pool: ThreadPool,
}

impl BinaryBackend {
    pub fn new(config: FeatureConfig) -> FeatureResult<Self> {
        let brief = BriefGenerator::new(config.patch_size);
        let pool = build_pool(config.n_threads)?;
        Ok(Self {
            detector: FastDetector::new(config)?,
            brief,
            pool,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        self.detector.config()
    }
}

impl FeatureBackend for BinaryBackend {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Binary
    }

    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet> {
        self.pool.install(|| {
            extract(&self.detector, image, |plane, w, h, kps| self.brief.describe(plane, w, h, kps))
        })
    }

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        a.hamming(b).map_or(f32::INFINITY, |d| d as f32)
    }
}

/// FAST corners with gradient orientation histogram descriptors
pub struct HistogramBackend {
    detector: FastDetector,
    histogram: HistogramGenerator,
    pool: ThreadPool,
}

impl HistogramBackend {
    pub fn new(config: FeatureConfig) -> FeatureResult<Self> {
        let histogram = HistogramGenerator::new(config.patch_size);
        let pool = build_pool(config.n_threads)?;
        Ok(Self {
            detector: FastDetector::new(config)?,
            histogram,
            pool,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        self.detector.config()
    }
}

impl FeatureBackend for HistogramBackend {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::GradientHistogram
    }

    fn detect_and_describe(&self, image: &Image) -> FeatureResult<FeatureSet> {
        self.pool.install(|| {
            extract(&self.detector, image, |plane, w, h, kps| self.histogram.describe(plane, w, h, kps))
        })
    }

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        a.euclidean(b).unwrap_or(f32::INFINITY)
    }
}

fn build_pool(n_threads: usize) -> FeatureResult<ThreadPool> {
    Ok(ThreadPoolBuilder::new().num_threads(n_threads.max(1)).build()?)
}

fn extract<F>(detector: &FastDetector, image: &Image, describe: F) -> FeatureResult<FeatureSet>
where
    F: Fn(&[f32], usize, usize, &[Keypoint]) -> Vec<Descriptor>,
{
    let (width, height) = image.dimensions();
    let keypoints = detector.detect(image.gray(), width, height)?;
    if keypoints.is_empty() {
        return Err(FeatureError::NoKeypoints);
    }

    let plane = smoothed_plane(image)?;
    let descriptors = describe(&plane, width, height, &keypoints);
    debug!(keypoints = keypoints.len(), width, height, "described image");
    Ok(FeatureSet { keypoints, descriptors })
}

/// Gaussian-smoothed grayscale as f32
fn smoothed_plane(image: &Image) -> FeatureResult<Vec<f32>> {
    let (width, height) = image.dimensions();
    let gray = GrayImage::from_raw(width as u32, height as u32, image.gray().to_vec()).ok_or(
        FeatureError::InvalidImageData {
            expected_len: width * height,
            actual_len: image.gray().len(),
        },
    )?;
    let blurred = imageproc::filter::gaussian_blur_f32(&gray, DESCRIPTOR_BLUR_SIGMA);
    Ok(blurred.into_raw().into_iter().map(f32::from).collect())
}
