// ============================================================
// Layer 3 - Cosmological Parameters
// ============================================================
// The six simulation parameters every map is labelled with.
// Maps and labels are stored normalised to [0, 1]; the bounds
// below are the fixed prior ranges of the simulation suite and
// are used once at the end of a run to get back physical units.
//
//   index  parameter  min    max
//   0      Omega_m    0.10   0.50
//   1      sigma_8    0.60   1.00
//   2      A_SN1      0.25   4.00
//   3      A_AGN1     0.25   4.00
//   4      A_SN2      0.50   2.00
//   5      A_AGN2     0.50   2.00

use serde::{Deserialize, Serialize};

/// Number of physical parameters attached to every simulation.
pub const NUM_PARAMETERS: usize = 6;

/// Lower bound of each parameter's prior range.
pub const PARAM_MIN: [f64; NUM_PARAMETERS] = [0.1, 0.6, 0.25, 0.25, 0.5, 0.5];

/// Upper bound of each parameter's prior range.
pub const PARAM_MAX: [f64; NUM_PARAMETERS] = [0.5, 1.0, 4.0, 4.0, 2.0, 2.0];

/// One of the six labelled parameters, in label-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CosmoParameter {
    OmegaM,
    Sigma8,
    ASn1,
    AAgn1,
    ASn2,
    AAgn2,
}

impl CosmoParameter {
    pub const ALL: [CosmoParameter; NUM_PARAMETERS] = [
        CosmoParameter::OmegaM,
        CosmoParameter::Sigma8,
        CosmoParameter::ASn1,
        CosmoParameter::AAgn1,
        CosmoParameter::ASn2,
        CosmoParameter::AAgn2,
    ];

    /// Parameter at a label-vector index, if the index is in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Fixed console label.
    pub fn label(self) -> &'static str {
        match self {
            CosmoParameter::OmegaM => "Omega_m",
            CosmoParameter::Sigma8 => "sigma_8",
            CosmoParameter::ASn1   => "A_SN1",
            CosmoParameter::AAgn1  => "A_AGN1",
            CosmoParameter::ASn2   => "A_SN2",
            CosmoParameter::AAgn2  => "A_AGN2",
        }
    }

    pub fn min(self) -> f64 {
        PARAM_MIN[self.index()]
    }

    pub fn max(self) -> f64 {
        PARAM_MAX[self.index()]
    }

    /// Width of the prior range, `max - min`.
    pub fn span(self) -> f64 {
        self.max() - self.min()
    }

    /// Map a physical value into [0, 1].
    pub fn normalize(self, value: f64) -> f64 {
        (value - self.min()) / self.span()
    }

    /// Map a [0, 1] value back to physical units: `v * (max - min) + min`.
    pub fn denormalize(self, normalized: f64) -> f64 {
        normalized * self.span() + self.min()
    }

    /// Uncertainties are spreads, not locations: scale only, no offset.
    pub fn denormalize_spread(self, normalized: f64) -> f64 {
        normalized.abs() * self.span()
    }
}

impl std::fmt::Display for CosmoParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
