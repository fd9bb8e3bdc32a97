// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// Seams between the pipeline stages. The application layer
// only sees these traits, never the concrete loader or the
// concrete model type.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::simulation::SimulationSuite;

// ─── SimulationSource ─────────────────────────────────────────────────────────
/// Anything that can produce a normalised simulation suite.
///
/// Implementations:
///   - NpyMapLoader → .npy field maps plus a text parameter table
pub trait SimulationSource {
    fn load_suite(&self) -> Result<SimulationSuite>;
}

// ─── DiagnosticParameterSource ────────────────────────────────────────────────
/// One named group of internal model values, read out for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticParameter {
    pub name:   String,
    pub values: Vec<f32>,
}

impl DiagnosticParameter {
    pub fn new(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self { name: name.into(), values }
    }
}

/// Optional capability: a model whose internal parameters are worth
/// tracking epoch by epoch. Reading them must not mutate the model.
pub trait DiagnosticParameterSource {
    fn diagnostic_parameters(&self) -> Result<Vec<DiagnosticParameter>>;
}
