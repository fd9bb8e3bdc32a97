// ============================================================
// Layer 3 - Simulation Suite
// ============================================================
// A suite of simulations, each contributing `maps_per_sim`
// consecutive maps and one parameter vector. Maps of every
// field channel are stacked so that map `m` of channel `c`
// starts at `((c * num_maps) + m) * height * width`.

use crate::domain::parameters::NUM_PARAMETERS;

/// All maps of all channels, plus the per-simulation labels.
#[derive(Debug, Clone)]
pub struct SimulationSuite {
    /// Number of field channels (one .npy file per channel)
    pub channels: usize,
    /// Maps per channel
    pub num_maps: usize,
    pub height: usize,
    pub width: usize,
    /// Consecutive maps belonging to one simulation
    pub maps_per_sim: usize,
    /// Channel-major pixel buffer, already normalised
    pub pixels: Vec<f32>,
    /// Normalised parameter vector of each simulation
    pub params: Vec<[f32; NUM_PARAMETERS]>,
}

impl SimulationSuite {
    pub fn num_sims(&self) -> usize {
        self.params.len()
    }

    pub fn map_len(&self) -> usize {
        self.height * self.width
    }

    /// Copy out map `index` as a `[C, H, W]` buffer.
    pub fn map(&self, index: usize) -> Vec<f32> {
        let len = self.map_len();
        let mut out = Vec::with_capacity(self.channels * len);
        for c in 0..self.channels {
            let start = (c * self.num_maps + index) * len;
            out.extend_from_slice(&self.pixels[start..start + len]);
        }
        out
    }

    /// Parameters of the simulation that produced map `index`.
    pub fn params_of_map(&self, index: usize) -> [f32; NUM_PARAMETERS] {
        self.params[index / self.maps_per_sim]
    }
}
