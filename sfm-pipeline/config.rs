use std::path::Path;

use serde::{Deserialize, Serialize};
use sfm_core::Intrinsics;
use sfm_features::FeatureConfig;
use sfm_geometry::{RansacOptions, MIN_CORRESPONDENCES};

use crate::error::{SfmError, SfmResult};
use crate::export::PlyFormat;

/// Pinhole parameters shared by every frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsConfig {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for IntrinsicsConfig {
    fn default() -> Self {
        Self {
            fx: 800.0,
            fy: 800.0,
            cx: 320.0,
            cy: 240.0,
        }
    }
}

impl IntrinsicsConfig {
    pub fn to_intrinsics(&self) -> SfmResult<Intrinsics> {
        Ok(Intrinsics::new(self.fx, self.fy, self.cx, self.cy)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Lowe ratio between best and second-best distance
    pub ratio_threshold: f32,
    /// Pairs with fewer accepted matches contribute no edge
    pub min_matches: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.75,
            min_matches: MIN_CORRESPONDENCES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iterations: usize,
    pub confidence: f64,
    /// Sampson distance in pixels
    pub threshold: f64,
    /// Fixed seed for reproducible runs; entropy-seeded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.999,
            threshold: 1.0,
            seed: None,
        }
    }
}

impl RansacConfig {
    pub fn options(&self) -> RansacOptions {
        RansacOptions {
            max_iterations: self.max_iterations,
            confidence: self.confidence,
            threshold: self.threshold,
            min_inliers: MIN_CORRESPONDENCES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Pixel tolerance in both views
    pub max_reprojection_error: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self { max_reprojection_error: 4.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: PlyFormat,
}

/// Complete reconstruction configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SfmConfig {
    pub intrinsics: IntrinsicsConfig,
    pub features: FeatureConfig,
    pub matching: MatchingConfig,
    pub ransac: RansacConfig,
    pub triangulation: TriangulationConfig,
    pub export: ExportConfig,
}

impl SfmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads JSON or TOML depending on the file extension, then validates
    pub fn load<P: AsRef<Path>>(path: P) -> SfmResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SfmError::io(path, e))?;
        match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => Self::from_json(&content),
            ConfigFormat::Toml => Self::from_toml(&content),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SfmResult<()> {
        let path = path.as_ref();
        let text = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => self.to_json()?,
            ConfigFormat::Toml => self.to_toml()?,
        };
        std::fs::write(path, text).map_err(|e| SfmError::io(path, e))
    }

    pub fn to_json(&self) -> SfmResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SfmError::Config(e.to_string()))
    }

    pub fn from_json(json: &str) -> SfmResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| SfmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> SfmResult<String> {
        toml::to_string_pretty(self).map_err(|e| SfmError::Config(e.to_string()))
    }

    pub fn from_toml(toml_str: &str) -> SfmResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| SfmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SfmResult<()> {
        self.intrinsics.to_intrinsics()?;

        self.features.validate().map_err(|e| SfmError::Config(e.to_string()))?;

        let ratio = self.matching.ratio_threshold;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(SfmError::Config(format!("ratio threshold {} outside (0, 1]", ratio)));
        }
        if self.matching.min_matches < MIN_CORRESPONDENCES {
            return Err(SfmError::Config(format!(
                "min_matches {} below the {} correspondences a relative pose needs",
                self.matching.min_matches, MIN_CORRESPONDENCES
            )));
        }

        let r = &self.ransac;
        if r.max_iterations == 0 {
            return Err(SfmError::Config("RANSAC needs at least one iteration".to_string()));
        }
        if !(r.confidence > 0.0 && r.confidence < 1.0) {
            return Err(SfmError::Config(format!("RANSAC confidence {} outside (0, 1)", r.confidence)));
        }
        if !(r.threshold.is_finite() && r.threshold > 0.0) {
            return Err(SfmError::Config(format!("RANSAC threshold {} must be positive", r.threshold)));
        }

        let max_err = self.triangulation.max_reprojection_error;
        if !(max_err.is_finite() && max_err > 0.0) {
            return Err(SfmError::Config(format!("reprojection tolerance {} must be positive", max_err)));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        let k = &self.intrinsics;
        format!(
            "K(fx={}, fy={}, cx={}, cy={}); {}; ratio {}, min {} matches; RANSAC {} it @ {} conf, {} px; tri {} px; {} PLY",
            k.fx,
            k.fy,
            k.cx,
            k.cy,
            self.features.summary(),
            self.matching.ratio_threshold,
            self.matching.min_matches,
            self.ransac.max_iterations,
            self.ransac.confidence,
            self.ransac.threshold,
            self.triangulation.max_reprojection_error,
            self.export.format,
        )
    }
}

enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> SfmResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(SfmError::Config(format!(
                "{}: expected a .json or .toml file",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfm_features::DescriptorKind;

    #[test]
    fn test_defaults() {
        let cfg = SfmConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.intrinsics, IntrinsicsConfig { fx: 800.0, fy: 800.0, cx: 320.0, cy: 240.0 });
        assert_eq!(cfg.matching.ratio_threshold, 0.75);
        assert_eq!(cfg.matching.min_matches, 8);
        assert_eq!(cfg.ransac.options(), RansacOptions::default());
        assert_eq!(cfg.triangulation.max_reprojection_error, 4.0);
        assert_eq!(cfg.export.format, PlyFormat::Ascii);
        assert_eq!(cfg.features.descriptor, DescriptorKind::GradientHistogram);
    }

    #[test]
    fn test_save_and_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = SfmConfig::default();
        cfg.ransac.seed = Some(17);
        cfg.matching.ratio_threshold = 0.6;
        cfg.export.format = PlyFormat::BinaryLittleEndian;
        cfg.features = cfg.features.with_descriptor(DescriptorKind::Binary);

        for name in ["cfg.json", "cfg.toml"] {
            let path = dir.path().join(name);
            cfg.save(&path).unwrap();
            assert_eq!(SfmConfig::load(&path).unwrap(), cfg);
        }
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg = SfmConfig::from_toml(
            r#"
            [intrinsics]
            fx = 1000.0
            fy = 1000.0

            [ransac]
            seed = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.intrinsics.fx, 1000.0);
        assert_eq!(cfg.intrinsics.cx, 320.0);
        assert_eq!(cfg.ransac.seed, Some(3));
        assert_eq!(cfg.ransac.max_iterations, 2000);
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        assert!(matches!(SfmConfig::default().save(&path), Err(SfmError::Config(_))));
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = SfmConfig::default();
        cfg.intrinsics.fx = 0.0;
        assert!(matches!(cfg.validate(), Err(SfmError::InvalidArgument(_))));

        let mut cfg = SfmConfig::default();
        cfg.matching.ratio_threshold = 1.5;
        assert!(matches!(cfg.validate(), Err(SfmError::Config(_))));

        let mut cfg = SfmConfig::default();
        cfg.matching.min_matches = 5;
        assert!(cfg.validate().is_err());

        let mut cfg = SfmConfig::default();
        cfg.ransac.confidence = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = SfmConfig::default();
        cfg.triangulation.max_reprojection_error = f64::NAN;
        assert!(cfg.validate().is_err());

        assert!(SfmConfig::from_json(r#"{"matching": {"ratio_threshold": 0.0}}"#).is_err());
    }
}
