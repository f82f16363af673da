//! Per-stage reports returned to the caller.
//!
//! Soft failures (an image without features, an under-matched pair, a pair
//! whose pose could not be recovered) are recorded here instead of aborting
//! the run.

use std::collections::BTreeMap;
use std::fmt;

use sfm_geometry::PointRejection;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectSummary {
    /// Keypoints per image, 0 for skipped images
    pub keypoints: Vec<usize>,
    /// Images the backend produced no features for
    pub skipped: Vec<usize>,
}

impl DetectSummary {
    pub fn total_keypoints(&self) -> usize {
        self.keypoints.iter().sum()
    }
}

impl fmt::Display for DetectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} feature points across {} images", self.total_keypoints(), self.keypoints.len())?;
        if !self.skipped.is_empty() {
            write!(f, ", skipped images {:?}", self.skipped)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientPair {
    pub pair: usize,
    pub found: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSummary {
    /// Accepted matches per pair, 0 for pairs without an edge
    pub matches: Vec<usize>,
    /// Pairs that matched but fell below the minimum
    pub insufficient: Vec<InsufficientPair>,
    /// Pairs with an image lacking features
    pub skipped: Vec<usize>,
}

impl MatchSummary {
    pub fn total_matches(&self) -> usize {
        self.matches.iter().sum()
    }
}

impl fmt::Display for MatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} matches over {} pairs {:?}", self.total_matches(), self.matches.len(), self.matches)?;
        if !self.insufficient.is_empty() {
            let pairs: Vec<usize> = self.insufficient.iter().map(|p| p.pair).collect();
            write!(f, ", insufficient pairs {:?}", pairs)?;
        }
        if !self.skipped.is_empty() {
            write!(f, ", skipped pairs {:?}", self.skipped)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseFailure {
    pub pair: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseSummary {
    /// Images with an absolute pose, including the origin
    pub posed: usize,
    /// `(pair, inliers)` for every recovered edge
    pub inliers: Vec<(usize, usize)>,
    pub failures: Vec<PoseFailure>,
    /// Pairs never attempted: no accepted matches or no pose to chain from
    pub skipped: Vec<usize>,
}

impl fmt::Display for PoseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} camera poses", self.posed)?;
        for failure in &self.failures {
            write!(f, "; pair {} failed: {}", failure.pair, failure.reason)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangulationSummary {
    /// `(pair, points added)` for every triangulated edge
    pub points: Vec<(usize, usize)>,
    pub rejected: BTreeMap<PointRejection, usize>,
    /// Edges that added nothing; informational only
    pub empty_pairs: Vec<usize>,
}

impl TriangulationSummary {
    pub fn total_points(&self) -> usize {
        self.points.iter().map(|&(_, n)| n).sum()
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }
}

impl fmt::Display for TriangulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} points", self.total_points())?;
        for (reason, count) in &self.rejected {
            write!(f, ", {} rejected ({})", count, reason)?;
        }
        if !self.empty_pairs.is_empty() {
            write!(f, ", empty pairs {:?}", self.empty_pairs)?;
        }
        Ok(())
    }
}
