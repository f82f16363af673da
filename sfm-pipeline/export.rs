//! PLY point cloud writer.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sfm_core::Point3D;

use crate::error::{SfmError, SfmResult};

/// Color written for points that carry none
pub const DEFAULT_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlyFormat {
    #[default]
    Ascii,
    BinaryLittleEndian,
}

impl fmt::Display for PlyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlyFormat::Ascii => write!(f, "ascii"),
            PlyFormat::BinaryLittleEndian => write!(f, "binary_little_endian"),
        }
    }
}

/// Serializes point clouds as PLY with `float` XYZ and `uchar` RGB vertices.
/// Output depends only on the points, so repeated exports are byte-identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointCloudExporter {
    format: PlyFormat,
}

impl PointCloudExporter {
    pub fn new(format: PlyFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> PlyFormat {
        self.format
    }

    pub fn write<W: Write>(&self, mut out: W, points: &[Point3D]) -> io::Result<()> {
        writeln!(out, "ply")?;
        writeln!(out, "format {} 1.0", self.format)?;
        writeln!(out, "comment sfm-pipeline sparse reconstruction")?;
        writeln!(out, "element vertex {}", points.len())?;
        for axis in ["x", "y", "z"] {
            writeln!(out, "property float {}", axis)?;
        }
        for channel in ["red", "green", "blue"] {
            writeln!(out, "property uchar {}", channel)?;
        }
        writeln!(out, "end_header")?;

        for p in points {
            let [x, y, z] = [p.position.x as f32, p.position.y as f32, p.position.z as f32];
            let [r, g, b] = p.color.unwrap_or(DEFAULT_COLOR);
            match self.format {
                PlyFormat::Ascii => writeln!(out, "{} {} {} {} {} {}", x, y, z, r, g, b)?,
                PlyFormat::BinaryLittleEndian => {
                    out.write_all(&x.to_le_bytes())?;
                    out.write_all(&y.to_le_bytes())?;
                    out.write_all(&z.to_le_bytes())?;
                    out.write_all(&[r, g, b])?;
                }
            }
        }
        out.flush()
    }

    /// Writes `points` to `path`, replacing any existing file
    pub fn export<P: AsRef<Path>>(&self, path: P, points: &[Point3D]) -> SfmResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SfmError::io(path, e))?;
        self.write(BufWriter::new(file), points).map_err(|e| SfmError::io(path, e))
    }
}
