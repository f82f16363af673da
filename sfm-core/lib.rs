mod camera;
mod error;

pub use camera::{CameraPose, Intrinsics};
pub use error::{CoreError, CoreResult};

use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major 8-bit grayscale buffer
pub type GrayBuffer = Vec<u8>;

/// Decoded frame: interleaved RGB8 pixels plus the grayscale copy the
/// detectors run on. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    rgb: Vec<u8>,
    gray: GrayBuffer,
}

impl Image {
    /// Builds an image from interleaved RGB8 data
    pub fn from_rgb(width: usize, height: usize, rgb: Vec<u8>) -> CoreResult<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidDimensions { width, height });
        }
        let expected = width * height * 3;
        if rgb.len() != expected {
            return Err(CoreError::BufferSizeMismatch { expected, actual: rgb.len() });
        }
        let gray = rgb.chunks_exact(3).map(|p| luma(p[0], p[1], p[2])).collect();
        Ok(Self { width, height, rgb, gray })
    }

    /// Builds an image from a grayscale buffer; colour samples come back gray
    pub fn from_gray(width: usize, height: usize, gray: GrayBuffer) -> CoreResult<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidDimensions { width, height });
        }
        let expected = width * height;
        if gray.len() != expected {
            return Err(CoreError::BufferSizeMismatch { expected, actual: gray.len() });
        }
        let rgb = gray.iter().flat_map(|&v| [v, v, v]).collect();
        Ok(Self { width, height, rgb, gray })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn gray(&self) -> &[u8] {
        &self.gray
    }

    pub fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    /// Nearest-pixel colour lookup; `None` outside the image
    pub fn color_at(&self, x: f32, y: f32) -> Option<[u8; 3]> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (xr, yr) = (x.round(), y.round());
        if xr < 0.0 || yr < 0.0 || xr >= self.width as f32 || yr >= self.height as f32 {
            return None;
        }
        let idx = (yr as usize * self.width + xr as usize) * 3;
        Some([self.rgb[idx], self.rgb[idx + 1], self.rgb[idx + 2]])
    }
}

/// ITU-R BT.601 luma, rounded
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// Detected corner with subpixel position in level-0 pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians
    pub angle: f32,
    /// Corner strength
    pub response: f32,
    /// Pyramid scale the corner was found at (1.0 = full resolution)
    pub scale: f32,
    pub octave: u8,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            angle: 0.0,
            response: 0.0,
            scale: 1.0,
            octave: 0,
        }
    }
}

/// Bytes in a binary descriptor (256 bits)
pub const BINARY_DESCRIPTOR_BYTES: usize = 32;

/// Feature descriptor. Opaque to the pipeline; only the producing backend
/// knows how to compare two of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Binary([u8; BINARY_DESCRIPTOR_BYTES]),
    Histogram(Vec<f32>),
}

impl Descriptor {
    /// Bit count of the XOR; `None` unless both are binary
    pub fn hamming(&self, other: &Descriptor) -> Option<u32> {
        match (self, other) {
            (Descriptor::Binary(a), Descriptor::Binary(b)) => {
                Some(a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum())
            }
            _ => None,
        }
    }

    /// Euclidean distance; `None` unless both are histograms of equal length
    pub fn euclidean(&self, other: &Descriptor) -> Option<f32> {
        match (self, other) {
            (Descriptor::Histogram(a), Descriptor::Histogram(b)) if a.len() == b.len() => {
                let ss: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                Some(ss.sqrt())
            }
            _ => None,
        }
    }
}

/// Directed correspondence from keypoint `query_idx` of image i to keypoint
/// `train_idx` of image i+1.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Reconstructed world point with the colour sampled from its source image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D {
    pub position: Point3<f64>,
    pub color: Option<[u8; 3]>,
}

impl Point3D {
    pub fn new(position: Point3<f64>, color: Option<[u8; 3]>) -> Self {
        Self { position, color }
    }
}
