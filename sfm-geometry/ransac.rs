//! Model-agnostic RANSAC with an injected random source.
//!
//! Implement [`Estimator`] for a model and call [`ransac`]. The loop draws
//! minimal samples, scores every hypothesis the estimator returns for that
//! sample, and shrinks its iteration budget as the best inlier ratio grows.

use rand::Rng;
use rand::seq::index;

use crate::error::{GeometryError, GeometryResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RansacOptions {
    /// Hard cap on sampling rounds
    pub max_iterations: usize,
    /// Stop once this probability of having drawn an all-inlier sample is reached
    pub confidence: f64,
    /// Residual at or below which a datum counts as an inlier
    pub threshold: f64,
    /// Consensus size below which the best model is rejected
    pub min_inliers: usize,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.999,
            threshold: 1.0,
            min_inliers: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: M,
    pub inliers: Vec<usize>,
    pub inlier_rms: f64,
    pub iterations: usize,
}

/// A model family RANSAC can hypothesise and score.
pub trait Estimator {
    type Datum;
    type Model: Clone;

    /// Minimal sample size
    const MIN_SAMPLES: usize;

    /// All hypotheses consistent with the sample; empty when degenerate
    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Vec<Self::Model>;

    /// Non-negative residual in the units of `RansacOptions::threshold`.
    /// `f64::INFINITY` marks a datum the model cannot explain at all.
    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64;
}

/// Iterations needed to reach `confidence` at the given inlier ratio
pub fn required_iterations(
    confidence: f64,
    inlier_ratio: f64,
    sample_size: usize,
    max_iterations: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iterations;
    }
    if inlier_ratio >= 1.0 {
        return 1.min(max_iterations);
    }
    let denom = (1.0 - inlier_ratio.powi(sample_size as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iterations;
    }
    let n = ((1.0 - confidence.min(1.0 - 1e-12)).ln() / denom).ceil();
    if n.is_finite() && n >= 0.0 {
        (n as usize).min(max_iterations)
    } else {
        max_iterations
    }
}

fn score<E: Estimator>(
    estimator: &E,
    model: &E::Model,
    data: &[E::Datum],
    threshold: f64,
) -> (Vec<usize>, f64) {
    let mut inliers = Vec::new();
    let mut ss = 0.0;
    for (i, datum) in data.iter().enumerate() {
        let r = estimator.residual(model, datum);
        if r <= threshold {
            inliers.push(i);
            ss += r * r;
        }
    }
    let rms = if inliers.is_empty() {
        f64::INFINITY
    } else {
        (ss / inliers.len() as f64).sqrt()
    };
    (inliers, rms)
}

/// Run RANSAC. Deterministic for a given `rng` state.
pub fn ransac<E, R>(
    estimator: &E,
    data: &[E::Datum],
    opts: &RansacOptions,
    rng: &mut R,
) -> GeometryResult<RansacResult<E::Model>>
where
    E: Estimator,
    R: Rng + ?Sized,
{
    if data.len() < E::MIN_SAMPLES {
        return Err(GeometryError::NotEnoughPoints {
            required: E::MIN_SAMPLES,
            found: data.len(),
        });
    }

    let mut best: Option<RansacResult<E::Model>> = None;
    let mut budget = opts.max_iterations;
    let mut iterations = 0;

    while iterations < budget {
        iterations += 1;
        let sample = index::sample(rng, data.len(), E::MIN_SAMPLES).into_vec();

        for model in estimator.fit(data, &sample) {
            let (inliers, inlier_rms) = score(estimator, &model, data, opts.threshold);
            let better = match &best {
                None => true,
                Some(b) => {
                    inliers.len() > b.inliers.len()
                        || (inliers.len() == b.inliers.len() && inlier_rms < b.inlier_rms)
                }
            };
            if better {
                let ratio = inliers.len() as f64 / data.len() as f64;
                budget = required_iterations(opts.confidence, ratio, E::MIN_SAMPLES, opts.max_iterations)
                    .max(iterations);
                best = Some(RansacResult { model, inliers, inlier_rms, iterations });
            }
        }
    }

    let mut best = best.ok_or(GeometryError::NoValidDecomposition)?;
    if best.inliers.len() < opts.min_inliers {
        return Err(GeometryError::InsufficientInliers {
            found: best.inliers.len(),
            required: opts.min_inliers,
        });
    }
    best.iterations = iterations;
    Ok(best)
}
