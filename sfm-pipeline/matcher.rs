//! Ratio-test descriptor matching between consecutive images.

use std::collections::HashMap;

use sfm_core::{Descriptor, Match};
use sfm_features::FeatureBackend;

use crate::config::MatchingConfig;

/// Outcome of matching one consecutive pair
#[derive(Debug, Clone, PartialEq)]
pub enum PairMatches {
    Accepted(Vec<Match>),
    /// Fewer survivors than the configured minimum
    Insufficient { found: usize },
}

/// Brute-force nearest-neighbour matcher with Lowe's ratio test and a
/// one-to-one constraint on the train side.
#[derive(Debug, Clone, PartialEq)]
pub struct PairMatcher {
    ratio_threshold: f32,
    min_matches: usize,
}

impl PairMatcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            ratio_threshold: config.ratio_threshold,
            min_matches: config.min_matches,
        }
    }

    pub fn ratio_threshold(&self) -> f32 {
        self.ratio_threshold
    }

    pub fn min_matches(&self) -> usize {
        self.min_matches
    }

    /// Matches `query` (image i) against `train` (image i + 1), ordered by
    /// query index
    pub fn match_descriptors(
        &self,
        backend: &dyn FeatureBackend,
        query: &[Descriptor],
        train: &[Descriptor],
    ) -> Vec<Match> {
        if train.len() < 2 {
            return Vec::new();
        }

        // train index -> (query index, distance) of the closest claimant
        let mut claims: HashMap<usize, (usize, f32)> = HashMap::new();
        for (q, descriptor) in query.iter().enumerate() {
            let Some((t, distance)) = self.ratio_test(backend, descriptor, train) else {
                continue;
            };
            claims
                .entry(t)
                .and_modify(|claim| {
                    if distance < claim.1 {
                        *claim = (q, distance);
                    }
                })
                .or_insert((q, distance));
        }

        let mut matches: Vec<Match> = claims
            .into_iter()
            .map(|(train_idx, (query_idx, distance))| Match { query_idx, train_idx, distance })
            .collect();
        matches.sort_by_key(|m| m.query_idx);
        matches
    }

    /// Nearest train descriptor if it beats the runner-up by the ratio
    fn ratio_test(
        &self,
        backend: &dyn FeatureBackend,
        descriptor: &Descriptor,
        train: &[Descriptor],
    ) -> Option<(usize, f32)> {
        let mut best = (usize::MAX, f32::INFINITY);
        let mut second = f32::INFINITY;
        for (t, candidate) in train.iter().enumerate() {
            let d = backend.distance(descriptor, candidate);
            if d < best.1 {
                second = best.1;
                best = (t, d);
            } else if d < second {
                second = d;
            }
        }
        (best.1.is_finite() && best.1 < self.ratio_threshold * second).then_some(best)
    }

    /// Matches a pair and applies the minimum-count filter
    pub fn match_pair(
        &self,
        backend: &dyn FeatureBackend,
        query: &[Descriptor],
        train: &[Descriptor],
    ) -> PairMatches {
        let matches = self.match_descriptors(backend, query, train);
        if matches.len() < self.min_matches {
            PairMatches::Insufficient { found: matches.len() }
        } else {
            PairMatches::Accepted(matches)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfm_core::Image;
    use sfm_features::{DescriptorKind, FeatureResult, FeatureSet};

    /// Distance is the absolute difference of the first histogram bin
    struct ScalarBackend;

    impl FeatureBackend for ScalarBackend {
        fn kind(&self) -> DescriptorKind {
            DescriptorKind::GradientHistogram
        }

        fn detect_and_describe(&self, _image: &Image) -> FeatureResult<FeatureSet> {
            Ok(FeatureSet::default())
        }

        fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
            a.euclidean(b).unwrap_or(f32::INFINITY)
        }
    }

    fn scalars(values: &[f32]) -> Vec<Descriptor> {
        values.iter().map(|&v| Descriptor::Histogram(vec![v])).collect()
    }

    fn matcher(min_matches: usize) -> PairMatcher {
        PairMatcher::new(&MatchingConfig { ratio_threshold: 0.75, min_matches })
    }

    #[test]
    fn test_ratio_test_filters_ambiguous() {
        let query = scalars(&[0.0, 5.0]);
        // 0.0: best 0.1, second 10 -> accepted; 5.0: best 4.9 vs 5.1 -> ambiguous
        let train = scalars(&[0.1, 10.0]);
        let m = matcher(1).match_descriptors(&ScalarBackend, &query, &train);
        assert_eq!(m.len(), 1);
        assert_eq!((m[0].query_idx, m[0].train_idx), (0, 0));
        assert!((m[0].distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_one_to_one_keeps_closest() {
        let query = scalars(&[1.0, 1.3, 20.0]);
        let train = scalars(&[1.1, 50.0, 20.5]);
        let m = matcher(1).match_descriptors(&ScalarBackend, &query, &train);
        let pairs: Vec<(usize, usize)> = m.iter().map(|m| (m.query_idx, m.train_idx)).collect();
        // Queries 0 and 1 both claim train 0; the closer one keeps it
        assert_eq!(pairs, [(0, 0), (2, 2)]);
    }

    #[test]
    fn test_single_candidate_is_rejected() {
        let m = matcher(1).match_descriptors(&ScalarBackend, &scalars(&[1.0]), &scalars(&[1.0]));
        assert!(m.is_empty());
    }

    #[test]
    fn test_min_matches() {
        let values: Vec<f32> = (0..10).map(|i| i as f32 * 10.0).collect();
        let d = scalars(&values);
        match matcher(8).match_pair(&ScalarBackend, &d, &d) {
            PairMatches::Accepted(m) => assert_eq!(m.len(), 10),
            other => panic!("expected matches, got {:?}", other),
        }
        assert_eq!(
            matcher(8).match_pair(&ScalarBackend, &d[..7], &d),
            PairMatches::Insufficient { found: 7 }
        );
    }
}
