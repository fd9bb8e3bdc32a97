// ============================================================
// Layer 4 - Simulation Map Loader
// ============================================================
// Loads a simulation suite from disk:
//
//   maps_<field>.npy   one file per channel, shape [N_maps, H, W]
//   params.txt         one row per simulation, >= 6 columns
//
// Every simulation contributes `maps_per_sim` consecutive maps,
// so N_maps must equal N_sims * maps_per_sim.
//
// Channels are normalised (see normalization.rs) against their
// reference file and parameters are rescaled to [0, 1] with the
// fixed prior bounds. Optionally each map's mean is removed
// after normalisation.

use anyhow::{bail, Context, Result};
use ndarray::Array3;
use ndarray_npy::read_npy;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::normalization::{remove_monopole, FieldStats};
use crate::domain::parameters::{CosmoParameter, NUM_PARAMETERS};
use crate::domain::simulation::SimulationSuite;
use crate::domain::traits::SimulationSource;

/// One input channel: the map file and the file its statistics come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub maps:      PathBuf,
    /// Reference used for mean/std; `None` means the map file itself
    pub reference: Option<PathBuf>,
    pub log10:     bool,
}

/// Loads `.npy` field maps and a parameter table.
pub struct NpyMapLoader {
    fields:        Vec<FieldSpec>,
    params_path:   PathBuf,
    maps_per_sim:  usize,
    keep_monopole: bool,
}

impl NpyMapLoader {
    pub fn new(fields: Vec<FieldSpec>, params_path: impl Into<PathBuf>, maps_per_sim: usize) -> Self {
        Self { fields, params_path: params_path.into(), maps_per_sim, keep_monopole: true }
    }

    /// `false` subtracts every map's mean after normalisation.
    pub fn with_monopole(mut self, keep: bool) -> Self {
        self.keep_monopole = keep;
        self
    }
}

impl SimulationSource for NpyMapLoader {
    fn load_suite(&self) -> Result<SimulationSuite> {
        if self.fields.is_empty() {
            bail!("no map files given");
        }
        if self.maps_per_sim == 0 {
            bail!("maps per simulation must be at least 1");
        }

        let params = read_params(&self.params_path)?;
        tracing::info!(
            "Read {} simulations from '{}'",
            params.len(),
            self.params_path.display()
        );

        let mut shape: Option<(usize, usize, usize)> = None;
        let mut pixels = Vec::new();

        for field in &self.fields {
            let maps = read_maps(&field.maps)?;
            let dims = maps.dim();

            match shape {
                None => shape = Some(dims),
                Some(expected) if expected != dims => bail!(
                    "'{}' has shape {:?}, expected {:?} like the first channel",
                    field.maps.display(), dims, expected
                ),
                Some(_) => {}
            }

            let mut channel = maps;

            let stats = match &field.reference {
                Some(reference) => FieldStats::from_reference(&read_maps(reference)?, field.log10),
                None => FieldStats::from_reference(&channel, field.log10),
            };
            stats.apply(&mut channel);
            if !self.keep_monopole {
                remove_monopole(&mut channel);
            }

            tracing::debug!(
                "Channel '{}': mean={:.4} std={:.4} log10={}",
                field.maps.display(), stats.mean, stats.std, stats.log10
            );
            // iter() walks the logical [map, row, col] order
            pixels.extend(channel.iter().copied());
        }

        // Non-empty fields means shape is set
        let (num_maps, height, width) = shape.unwrap_or_default();

        if num_maps != params.len() * self.maps_per_sim {
            bail!(
                "{} maps per channel but {} simulations x {} maps each = {}",
                num_maps,
                params.len(),
                self.maps_per_sim,
                params.len() * self.maps_per_sim
            );
        }

        Ok(SimulationSuite {
            channels: self.fields.len(),
            num_maps,
            height,
            width,
            maps_per_sim: self.maps_per_sim,
            pixels,
            params,
        })
    }
}

/// Read a `[N, H, W]` stack, accepting both float32 and float64 files.
fn read_maps(path: &Path) -> Result<Array3<f32>> {
    match read_npy::<_, Array3<f32>>(path) {
        Ok(maps) => Ok(maps),
        Err(f32_err) => {
            let maps: Array3<f64> = read_npy(path).map_err(|_| f32_err).with_context(|| {
                format!("Cannot read map stack '{}'", path.display())
            })?;
            Ok(maps.mapv(|v| v as f32))
        }
    }
}

/// Parse the parameter table and normalise every row to [0, 1].
pub fn read_params(path: &Path) -> Result<Vec<[f32; NUM_PARAMETERS]>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read parameter file '{}'", path.display()))?;
    parse_params(&text)
        .with_context(|| format!("Invalid parameter file '{}'", path.display()))
}

/// Parse whitespace-separated rows; extra columns are ignored.
pub fn parse_params(text: &str) -> Result<Vec<[f32; NUM_PARAMETERS]>> {
    let mut rows = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let values: Vec<f64> = line
            .split_whitespace()
            .map(|tok| tok.parse::<f64>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("line {}: non-numeric value", line_no + 1))?;

        if values.len() < NUM_PARAMETERS {
            bail!(
                "line {}: expected at least {} columns, found {}",
                line_no + 1, NUM_PARAMETERS, values.len()
            );
        }

        let mut row = [0.0f32; NUM_PARAMETERS];
        for (slot, p) in row.iter_mut().zip(CosmoParameter::ALL) {
            *slot = p.normalize(values[p.index()]) as f32;
        }
        rows.push(row);
    }

    if rows.is_empty() {
        bail!("no parameter rows found");
    }
    Ok(rows)
}
