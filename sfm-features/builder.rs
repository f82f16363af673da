use crate::config::FeatureConfig;
use crate::error::FeatureResult;
use crate::{BinaryBackend, DescriptorKind, FeatureBackend, HistogramBackend};

/// Fluent builder for feature backends
#[derive(Debug, Clone, Default)]
pub struct BackendBuilder {
    config: FeatureConfig,
}

impl BackendBuilder {
    /// Create a new builder with the balanced preset
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor(mut self, kind: DescriptorKind) -> Self {
        self.config.descriptor = kind;
        self
    }

    /// Set the FAST threshold (1-127)
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set the patch size for orientation and descriptors
    pub fn patch_size(mut self, patch_size: usize) -> Self {
        self.config.patch_size = patch_size;
        self
    }

    pub fn pyramid(mut self, levels: usize, scale_factor: f32) -> Self {
        self.config.pyramid_levels = levels;
        self.config.scale_factor = scale_factor;
        self
    }

    pub fn nms_distance(mut self, distance: f32) -> Self {
        self.config.nms_distance = distance;
        self
    }

    pub fn max_features(mut self, max_features: usize) -> Self {
        self.config.max_features = max_features;
        self
    }

    pub fn subpixel_refinement(mut self, enable: bool) -> Self {
        self.config.subpixel_refinement = enable;
        self
    }

    /// Set the number of worker threads for detection and description
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    pub fn preset_fast(self) -> Self {
        self.with_preset(FeatureConfig::fast_preset())
    }

    pub fn preset_balanced(self) -> Self {
        self.with_preset(FeatureConfig::balanced_preset())
    }

    pub fn preset_quality(self) -> Self {
        self.with_preset(FeatureConfig::quality_preset())
    }

    /// Presets keep the chosen descriptor and thread count
    fn with_preset(self, preset: FeatureConfig) -> Self {
        Self {
            config: FeatureConfig {
                descriptor: self.config.descriptor,
                n_threads: self.config.n_threads,
                ..preset
            },
        }
    }

    pub fn binary(self) -> FeatureResult<BinaryBackend> {
        BinaryBackend::new(self.config)
    }

    pub fn histogram(self) -> FeatureResult<HistogramBackend> {
        HistogramBackend::new(self.config)
    }

    /// Build the backend selected by the descriptor kind
    pub fn build(self) -> FeatureResult<Box<dyn FeatureBackend>> {
        Ok(match self.config.descriptor {
            DescriptorKind::Binary => Box::new(self.binary()?),
            DescriptorKind::GradientHistogram => Box::new(self.histogram()?),
        })
    }

    pub fn summary(&self) -> String {
        self.config.summary()
    }

    pub fn from_config(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn to_config(self) -> FeatureConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureError;

    #[test]
    fn test_fluent_settings_reach_config() {
        let cfg = BackendBuilder::new()
            .descriptor(DescriptorKind::Binary)
            .threshold(35)
            .patch_size(21)
            .pyramid(2, 1.5)
            .nms_distance(4.0)
            .max_features(300)
            .subpixel_refinement(false)
            .threads(2)
            .to_config();
        assert_eq!(cfg.descriptor, DescriptorKind::Binary);
        assert_eq!(cfg.threshold, 35);
        assert_eq!(cfg.patch_size, 21);
        assert_eq!((cfg.pyramid_levels, cfg.scale_factor), (2, 1.5));
        assert_eq!(cfg.max_features, 300);
        assert!(!cfg.subpixel_refinement);
        assert_eq!(cfg.n_threads, 2);
    }

    #[test]
    fn test_preset_keeps_descriptor_and_threads() {
        let cfg = BackendBuilder::new()
            .descriptor(DescriptorKind::Binary)
            .threads(3)
            .preset_quality()
            .to_config();
        assert_eq!(cfg.descriptor, DescriptorKind::Binary);
        assert_eq!(cfg.n_threads, 3);
        assert_eq!(cfg.threshold, FeatureConfig::quality_preset().threshold);
    }

    #[test]
    fn test_build_selects_backend_kind() {
        let binary = BackendBuilder::new().descriptor(DescriptorKind::Binary).threads(1).build().unwrap();
        assert_eq!(binary.kind(), DescriptorKind::Binary);
        let hist = BackendBuilder::new().threads(1).build().unwrap();
        assert_eq!(hist.kind(), DescriptorKind::GradientHistogram);
    }

    #[test]
    fn test_build_validates() {
        let err = BackendBuilder::new().threshold(0).build();
        assert!(matches!(err, Err(FeatureError::InvalidThreshold(0))));
    }
}
