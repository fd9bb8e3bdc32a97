// ============================================================
// Layer 4 - Train/Validation/Test Splitter
// ============================================================
// Splits a simulation suite into three disjoint sets.
//
// The split is done over SIMULATIONS, not maps: every map of a
// simulation shares the same parameters, so letting sibling
// maps leak into the validation or test set would overstate
// how well the network generalises.
//
//   train  first 90 % of the permuted simulations
//   valid  next   5 %
//   test   last   5 %
//
// The permutation is seeded, so the same seed always produces
// the same three sets. This matters because `evaluate` rebuilds
// the test set in a separate process.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

const TRAIN_FRACTION: f64 = 0.90;
const VALID_FRACTION: f64 = 0.05;

/// Which subset of the suite a dataset is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test  => "test",
        })
    }
}

/// Simulation indices of each split.
#[derive(Debug, Clone)]
pub struct SimulationSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
    pub test:  Vec<usize>,
}

impl SimulationSplit {
    /// Seeded permutation of `0..num_sims`, cut 90/5/5.
    pub fn new(num_sims: usize, seed: u64) -> Self {
        let mut sims: Vec<usize> = (0..num_sims).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        sims.shuffle(&mut rng);

        let train_end = ((num_sims as f64) * TRAIN_FRACTION).round() as usize;
        let valid_end = ((num_sims as f64) * (TRAIN_FRACTION + VALID_FRACTION)).round() as usize;
        let train_end = train_end.min(num_sims);
        let valid_end = valid_end.clamp(train_end, num_sims);

        let test  = sims.split_off(valid_end);
        let valid = sims.split_off(train_end);

        tracing::debug!(
            "Simulation split: {} train, {} valid, {} test",
            sims.len(), valid.len(), test.len()
        );

        Self { train: sims, valid, test }
    }

    pub fn sims(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test  => &self.test,
        }
    }

    /// Expand simulation indices into map indices.
    pub fn map_indices(&self, split: Split, maps_per_sim: usize) -> Vec<usize> {
        self.sims(split)
            .iter()
            .flat_map(|&sim| sim * maps_per_sim..(sim + 1) * maps_per_sim)
            .collect()
    }
}
