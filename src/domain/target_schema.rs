// ============================================================
// Layer 3 - Target Schema
// ============================================================
// The network predicts a vector of `features` numbers per map.
// Which of those are parameter means and which are predicted
// standard deviations depends only on the feature count:
//
//   features  means (g)  uncertainties (h)
//   2         0..2       -
//   4         0..2       2..4
//   6         0..6       -
//   12        0..6       6..12
//
// Means always map onto the first label indices, so the label
// columns used as targets are the same range as `g`.

use std::ops::Range;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::domain::parameters::CosmoParameter;

/// Supported network output widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum FeatureCount {
    Two,
    Four,
    Six,
    Twelve,
}

impl FeatureCount {
    pub fn get(self) -> usize {
        match self {
            FeatureCount::Two    => 2,
            FeatureCount::Four   => 4,
            FeatureCount::Six    => 6,
            FeatureCount::Twelve => 12,
        }
    }

    pub fn schema(self) -> TargetSchema {
        match self {
            FeatureCount::Two    => TargetSchema::MeanOnly { means: 0..2 },
            FeatureCount::Four   => TargetSchema::MeanAndUncertainty { means: 0..2, uncertainties: 2..4 },
            FeatureCount::Six    => TargetSchema::MeanOnly { means: 0..6 },
            FeatureCount::Twelve => TargetSchema::MeanAndUncertainty { means: 0..6, uncertainties: 6..12 },
        }
    }
}

impl TryFrom<usize> for FeatureCount {
    type Error = anyhow::Error;

    fn try_from(n: usize) -> Result<Self> {
        match n {
            2  => Ok(FeatureCount::Two),
            4  => Ok(FeatureCount::Four),
            6  => Ok(FeatureCount::Six),
            12 => Ok(FeatureCount::Twelve),
            other => bail!("unsupported feature count {other}: expected 2, 4, 6 or 12"),
        }
    }
}

impl From<FeatureCount> for usize {
    fn from(f: FeatureCount) -> usize {
        f.get()
    }
}

impl std::str::FromStr for FeatureCount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let n: usize = s.trim().parse()
            .map_err(|_| anyhow::anyhow!("feature count must be an integer, got '{s}'"))?;
        FeatureCount::try_from(n)
    }
}

/// How the output vector splits into means and uncertainties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSchema {
    MeanOnly { means: Range<usize> },
    MeanAndUncertainty { means: Range<usize>, uncertainties: Range<usize> },
}

impl TargetSchema {
    /// Output (and label) indices holding parameter means.
    pub fn means(&self) -> Range<usize> {
        match self {
            TargetSchema::MeanOnly { means } => means.clone(),
            TargetSchema::MeanAndUncertainty { means, .. } => means.clone(),
        }
    }

    /// Output indices holding predicted standard deviations, if any.
    pub fn uncertainties(&self) -> Option<Range<usize>> {
        match self {
            TargetSchema::MeanOnly { .. } => None,
            TargetSchema::MeanAndUncertainty { uncertainties, .. } => Some(uncertainties.clone()),
        }
    }

    pub fn has_uncertainty(&self) -> bool {
        self.uncertainties().is_some()
    }

    /// Number of regressed parameters, `len(g)`.
    pub fn num_targets(&self) -> usize {
        self.means().len()
    }

    /// Total output width the model must produce.
    pub fn width(&self) -> usize {
        self.num_targets() + self.uncertainties().map_or(0, |h| h.len())
    }

    /// Parameters being regressed, in output order.
    pub fn parameters(&self) -> Vec<CosmoParameter> {
        self.means()
            .filter_map(CosmoParameter::from_index)
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FeatureCount; 4] = [
        FeatureCount::Two, FeatureCount::Four, FeatureCount::Six, FeatureCount::Twelve,
    ];

    #[test]
    fn test_uncertainty_modes_partition_outputs() {
        for f in [FeatureCount::Four, FeatureCount::Twelve] {
            let schema = f.schema();
            let g = schema.means();
            let h = schema.uncertainties().expect("uncertainty mode");
            assert_eq!(g.len() + h.len(), f.get());

            // Disjoint and covering exactly 0..features
            let mut seen = vec![false; f.get()];
            for i in g.chain(h) {
                assert!(!seen[i], "index {i} used twice");
                seen[i] = true;
            }
            assert!(seen.into_iter().all(|s| s));
        }
    }

    #[test]
    fn test_mean_only_modes_have_no_uncertainty() {
        for f in [FeatureCount::Two, FeatureCount::Six] {
            let schema = f.schema();
            assert!(schema.uncertainties().is_none());
            assert_eq!(schema.means(), 0..f.get());
        }
    }

    #[test]
    fn test_width_matches_feature_count() {
        for f in ALL {
            assert_eq!(f.schema().width(), f.get());
        }
    }

    #[test]
    fn test_unsupported_counts_are_rejected() {
        assert!(FeatureCount::try_from(3).is_err());
        assert!(FeatureCount::try_from(0).is_err());
        assert!("8".parse::<FeatureCount>().is_err());
        assert_eq!("12".parse::<FeatureCount>().unwrap(), FeatureCount::Twelve);
    }

    #[test]
    fn test_parameters_follow_means() {
        let params = FeatureCount::Four.schema().parameters();
        assert_eq!(params, vec![CosmoParameter::OmegaM, CosmoParameter::Sigma8]);
        assert_eq!(FeatureCount::Twelve.schema().parameters().len(), 6);
    }

    #[test]
    fn test_serde_uses_plain_integer() {
        let json = serde_json::to_string(&FeatureCount::Four).unwrap();
        assert_eq!(json, "4");
        let back: FeatureCount = serde_json::from_str("6").unwrap();
        assert_eq!(back, FeatureCount::Six);
        assert!(serde_json::from_str::<FeatureCount>("5").is_err());
    }
}
