use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("need at least {required} correspondences, got {found}")]
    NotEnoughPoints { required: usize, found: usize },

    #[error("mismatched inputs: {left} points against {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("only {found} inliers after robust fitting, need {required}")]
    InsufficientInliers { found: usize, required: usize },

    #[error("median triangulation angle {median:.3} deg below {required} deg, baseline too short")]
    InsufficientParallax { median: f64, required: f64 },

    #[error("no geometrically valid pose among the essential matrix decompositions")]
    NoValidDecomposition,

    #[error("decomposition failed: {0}")]
    Decomposition(&'static str),
}

pub type GeometryResult<T> = Result<T, GeometryError>;
