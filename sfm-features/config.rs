use crate::builder::BackendBuilder;
use crate::error::{FeatureError, FeatureResult};
use crate::DescriptorKind;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Complete feature backend configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FeatureConfig {
    /// Descriptor family produced for every keypoint
    pub descriptor: DescriptorKind,
    /// FAST intensity threshold (1-127)
    pub threshold: u8,
    /// Support window for orientation and descriptors, odd
    pub patch_size: usize,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
    /// Minimum spacing between keypoints on a level
    pub nms_distance: f32,
    /// Strongest keypoints kept per image, 0 keeps all
    pub max_features: usize,
    pub subpixel_refinement: bool,
    pub n_threads: usize,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub description: Option<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::balanced_preset()
    }
}

impl FeatureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single scale, coarse threshold, no refinement
    pub fn fast_preset() -> Self {
        Self {
            descriptor: DescriptorKind::default(),
            threshold: 30,
            patch_size: 15,
            pyramid_levels: 1,
            scale_factor: 1.2,
            nms_distance: 5.0,
            max_features: 1000,
            subpixel_refinement: false,
            n_threads: num_cpus::get(),
            name: Some("Fast".to_string()),
            description: Some("Single scale with few, strong corners".to_string()),
        }
    }

    pub fn balanced_preset() -> Self {
        Self {
            descriptor: DescriptorKind::default(),
            threshold: 20,
            patch_size: 31,
            pyramid_levels: 4,
            scale_factor: 1.2,
            nms_distance: 3.0,
            max_features: 2000,
            subpixel_refinement: true,
            n_threads: num_cpus::get(),
            name: Some("Balanced".to_string()),
            description: Some("Moderate pyramid with subpixel refinement".to_string()),
        }
    }

    /// Low threshold, deep pyramid, dense corners
    pub fn quality_preset() -> Self {
        Self {
            descriptor: DescriptorKind::default(),
            threshold: 12,
            patch_size: 31,
            pyramid_levels: 8,
            scale_factor: 1.2,
            nms_distance: 2.0,
            max_features: 5000,
            subpixel_refinement: true,
            n_threads: num_cpus::get(),
            name: Some("Quality".to_string()),
            description: Some("Deep pyramid tuned for texture-poor scenes".to_string()),
        }
    }

    pub fn with_descriptor(mut self, descriptor: DescriptorKind) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Add metadata to configuration
    pub fn with_metadata(mut self, name: &str, description: &str) -> Self {
        self.name = Some(name.to_string());
        self.description = Some(description.to_string());
        self
    }

    /// Convert to a builder for further customization
    pub fn to_builder(self) -> BackendBuilder {
        BackendBuilder::from_config(self)
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "FeatureConfig[{}]: descriptor={}, threshold={}, patch={}, levels={}x{:.2}, nms={:.1}, max={}, subpixel={}, threads={}",
            self.name.as_deref().unwrap_or("custom"),
            self.descriptor,
            self.threshold,
            self.patch_size,
            self.pyramid_levels,
            self.scale_factor,
            self.nms_distance,
            self.max_features,
            self.subpixel_refinement,
            self.n_threads
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> FeatureResult<()> {
        if self.threshold == 0 || self.threshold > 127 {
            return Err(FeatureError::InvalidThreshold(self.threshold));
        }
        if self.patch_size % 2 == 0 || self.patch_size < 7 {
            return Err(FeatureError::InvalidPatchSize(self.patch_size));
        }
        let bad_factor = !self.scale_factor.is_finite() || self.scale_factor <= 1.0;
        if self.pyramid_levels == 0 || (self.pyramid_levels > 1 && bad_factor) {
            return Err(FeatureError::InvalidPyramid {
                levels: self.pyramid_levels,
                scale_factor: self.scale_factor,
            });
        }
        if !self.nms_distance.is_finite() || self.nms_distance < 0.0 {
            return Err(FeatureError::Config(format!(
                "nms_distance must be finite and >= 0, got {}",
                self.nms_distance
            )));
        }
        Ok(())
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> FeatureResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FeatureError::Config(e.to_string()))
    }

    /// Deserialize from JSON string and validate
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> FeatureResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| FeatureError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> FeatureResult<String> {
        toml::to_string_pretty(self).map_err(|e| FeatureError::Config(e.to_string()))
    }

    /// Deserialize from TOML string and validate
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> FeatureResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| FeatureError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for cfg in [
            FeatureConfig::fast_preset(),
            FeatureConfig::balanced_preset(),
            FeatureConfig::quality_preset(),
        ] {
            assert!(cfg.validate().is_ok(), "{}", cfg.summary());
            assert!(cfg.n_threads >= 1);
        }
    }

    #[test]
    fn test_default_is_gradient_histogram() {
        assert_eq!(FeatureConfig::default().descriptor, DescriptorKind::GradientHistogram);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = FeatureConfig::default();
        cfg.threshold = 0;
        assert!(matches!(cfg.validate(), Err(FeatureError::InvalidThreshold(0))));

        let mut cfg = FeatureConfig::default();
        cfg.patch_size = 16;
        assert!(matches!(cfg.validate(), Err(FeatureError::InvalidPatchSize(16))));

        let mut cfg = FeatureConfig::default();
        cfg.scale_factor = 1.0;
        assert!(matches!(cfg.validate(), Err(FeatureError::InvalidPyramid { .. })));

        // A single level ignores the scale factor
        cfg.pyramid_levels = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_summary_mentions_descriptor() {
        let cfg = FeatureConfig::fast_preset()
            .with_descriptor(DescriptorKind::Binary)
            .with_metadata("Mine", "custom set");
        let s = cfg.summary();
        assert!(s.contains("Mine"));
        assert!(s.contains("binary"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_and_toml_round_trip() {
        let cfg = FeatureConfig::quality_preset().with_descriptor(DescriptorKind::Binary);
        assert_eq!(FeatureConfig::from_json(&cfg.to_json().unwrap()).unwrap(), cfg);
        assert_eq!(FeatureConfig::from_toml(&cfg.to_toml().unwrap()).unwrap(), cfg);
        assert!(FeatureConfig::from_json(r#"{"threshold": 0}"#).is_err());
    }
}
