use anyhow::{bail, Result};
use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::augment::Dihedral;
use crate::data::splitter::{SimulationSplit, Split};
use crate::domain::parameters::NUM_PARAMETERS;
use crate::domain::simulation::SimulationSuite;

/// One normalised map with the normalised parameters of its simulation.
/// `map` is channel-major `[C, H, W]`.
#[derive(Debug, Clone)]
pub struct MapSample {
    pub map:    Vec<f32>,
    pub params: [f32; NUM_PARAMETERS],
}

/// How training maps are augmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Augmentation {
    None,
    /// Draw one of the 8 views each time a sample is fetched
    RandomView,
    /// All 8 views stored up front
    Materialized,
}

pub struct MapDataset {
    samples:  Vec<MapSample>,
    augment:  Augmentation,
    channels: usize,
    side:     usize,
    seed:     u64,
    /// Per-sample fetch count; the n-th fetch of sample i always
    /// draws the same view for a given seed, whatever the worker order.
    fetches:  Vec<AtomicU64>,
}

impl MapDataset {
    pub fn new(samples: Vec<MapSample>, channels: usize, side: usize, augment: Augmentation) -> Self {
        let fetches = match augment {
            Augmentation::RandomView => samples.iter().map(|_| AtomicU64::new(0)).collect(),
            Augmentation::None | Augmentation::Materialized => Vec::new(),
        };
        Self { samples, augment, channels, side, seed: 0, fetches }
    }

    /// Seed of the random view draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn view_rng(&self, index: usize) -> StdRng {
        let draw = self.fetches[index].fetch_add(1, Ordering::Relaxed);
        let key  = self.seed
            ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ draw.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        StdRng::seed_from_u64(key)
    }

    /// Build the dataset of one split. Only the training split is augmented.
    pub fn from_suite(
        suite:       &SimulationSuite,
        split:       &SimulationSplit,
        which:       Split,
        materialize: bool,
        seed:        u64,
    ) -> Result<Self> {
        let augment = match which {
            Split::Train if materialize => Augmentation::Materialized,
            Split::Train => Augmentation::RandomView,
            Split::Valid | Split::Test => Augmentation::None,
        };

        if augment != Augmentation::None && suite.height != suite.width {
            bail!(
                "rotation augmentation needs square maps, got {}x{}",
                suite.height, suite.width
            );
        }

        let side = suite.height;
        let mut samples = Vec::new();

        for index in split.map_indices(which, suite.maps_per_sim) {
            let map    = suite.map(index);
            let params = suite.params_of_map(index);

            if augment == Augmentation::Materialized {
                for view in Dihedral::all() {
                    samples.push(MapSample { map: view.apply(&map, suite.channels, side), params });
                }
            } else {
                samples.push(MapSample { map, params });
            }
        }

        tracing::info!("{} set: {} samples ({:?})", which, samples.len(), augment);
        Ok(Self::new(samples, suite.channels, side, augment).with_seed(seed))
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    pub fn channels(&self) -> usize { self.channels }

    /// Map height and width (maps are square).
    pub fn side(&self) -> usize { self.side }
}

impl Dataset<MapSample> for MapDataset {
    fn get(&self, index: usize) -> Option<MapSample> {
        let sample = self.samples.get(index)?;
        match self.augment {
            Augmentation::RandomView => {
                let view = Dihedral::random(&mut self.view_rng(index));
                Some(MapSample {
                    map:    view.apply(&sample.map, self.channels, self.side),
                    params: sample.params,
                })
            }
            Augmentation::None | Augmentation::Materialized => Some(sample.clone()),
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(num_sims: usize, maps_per_sim: usize) -> SimulationSuite {
        let num_maps = num_sims * maps_per_sim;
        SimulationSuite {
            channels: 1,
            num_maps,
            height: 2,
            width: 2,
            maps_per_sim,
            pixels: (0..num_maps * 4).map(|v| v as f32).collect(),
            params: (0..num_sims).map(|s| [s as f32 / num_sims as f32; NUM_PARAMETERS]).collect(),
        }
    }

    #[test]
    fn test_materialized_training_set_holds_eight_views() {
        let s     = suite(20, 2);
        let split = SimulationSplit::new(20, 0);
        let train = MapDataset::from_suite(&s, &split, Split::Train, true, 0).unwrap();
        assert_eq!(train.len(), split.train.len() * 2 * 8);
    }

    #[test]
    fn test_eval_splits_are_not_augmented() {
        let s     = suite(20, 2);
        let split = SimulationSplit::new(20, 0);
        let test  = MapDataset::from_suite(&s, &split, Split::Test, true, 0).unwrap();
        assert_eq!(test.len(), split.test.len() * 2);

        // Fetching twice yields the same, untouched map
        let a = test.get(0).unwrap();
        let b = test.get(0).unwrap();
        assert_eq!(a.map, b.map);
    }

    #[test]
    fn test_random_view_keeps_params_and_pixels() {
        let s     = suite(20, 1);
        let split = SimulationSplit::new(20, 0);
        let train = MapDataset::from_suite(&s, &split, Split::Train, false, 0).unwrap();

        let sim    = split.train[0];
        let sample = train.get(0).unwrap();
        assert_eq!(sample.params, s.params[sim]);

        let mut got = sample.map.clone();
        got.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(got, s.map(sim));
    }

    #[test]
    fn test_random_views_repeat_for_the_same_seed() {
        let s     = suite(20, 1);
        let split = SimulationSplit::new(20, 0);
        let views = |seed: u64| -> Vec<Vec<f32>> {
            let train = MapDataset::from_suite(&s, &split, Split::Train, false, seed).unwrap();
            (0..3)
                .flat_map(|_| (0..train.len()).map(|i| train.get(i).unwrap().map).collect::<Vec<_>>())
                .collect()
        };
        assert_eq!(views(7), views(7));
        assert_ne!(views(7), views(8));
    }

    #[test]
    fn test_out_of_range_is_none() {
        let ds = MapDataset::new(Vec::new(), 1, 2, Augmentation::None);
        assert!(ds.get(0).is_none());
        assert!(ds.is_empty());
        assert_eq!((ds.channels(), ds.side()), (1, 2));
    }
}
