use std::path::PathBuf;

use sfm_core::CoreError;
use sfm_features::FeatureError;
use thiserror::Error;

use crate::state::Stage;

#[derive(Debug, Error)]
pub enum SfmError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Feature detection failed for image {index}")]
    FeatureDetectionFailed { index: usize },

    #[error("Pair {pair}: {found} matches, need {required}")]
    InsufficientMatches { pair: usize, found: usize, required: usize },

    #[error("Pose estimation failed for pair {pair}: {reason}")]
    PoseEstimationFailed { pair: usize, reason: String },

    #[error("No images loaded")]
    NoImages,

    #[error("Stage out of order: expected to follow {expected}, pipeline is at {actual}")]
    StageOrder { expected: Stage, actual: Stage },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feature backend error: {0}")]
    Feature(#[from] FeatureError),
}

impl SfmError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SfmError::Io { path: path.into(), source }
    }
}

impl From<CoreError> for SfmError {
    fn from(err: CoreError) -> Self {
        SfmError::InvalidArgument(err.to_string())
    }
}

pub type SfmResult<T> = Result<T, SfmError>;
