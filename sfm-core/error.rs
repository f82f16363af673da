use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("focal lengths must be positive and finite, got fx={fx}, fy={fy}")]
    InvalidFocalLength { fx: f64, fy: f64 },
    #[error("principal point must be finite, got cx={cx}, cy={cy}")]
    InvalidPrincipalPoint { cx: f64, cy: f64 },
    #[error("invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidDimensions { width: usize, height: usize },
    #[error("pixel buffer length mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },
    #[error("matrix is not an upper-triangular pinhole calibration matrix")]
    NotPinhole,
}

pub type CoreResult<T> = Result<T, CoreError>;
