// ============================================================
// Layer 6 - Metrics Logger
// ============================================================
// Records one row per epoch so learning curves can be plotted
// after the run.
//
// Output files (checkpoint directory):
//   metrics.csv     epoch,train_loss,valid_loss,learning_rate,elapsed_secs
//   filters.jsonl   one JSON object per epoch with the scattering
//                   filter parameters (scattering models only)
//
// Example CSV output:
//   epoch,train_loss,valid_loss,learning_rate,elapsed_secs
//   1,-2.104519,-2.398811,2.000000e-4,12.4
//   2,-2.711236,-2.802455,2.000000e-4,24.9
//
// Both files are truncated when a new run starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::traits::DiagnosticParameter;

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Epoch training loss, mean over targets of log(loss1) [+ log(loss2)]
    pub train_loss: f64,

    /// Same quantity on the validation set
    pub valid_loss: f64,

    /// Learning rate used during this epoch
    pub learning_rate: f64,

    /// Seconds since training started
    pub elapsed_secs: f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:         usize,
        train_loss:    f64,
        valid_loss:    f64,
        learning_rate: f64,
        elapsed_secs:  f64,
    ) -> Self {
        Self { epoch, train_loss, valid_loss, learning_rate, elapsed_secs }
    }

    /// Returns true if this epoch beat the best validation loss so far
    pub fn is_improvement(&self, best_valid_loss: f64) -> bool {
        self.valid_loss < best_valid_loss
    }

    /// Console line: "%03d %.3e %.3e"
    pub fn console_line(&self) -> String {
        format!("{:03} {} {}", self.epoch, format_sci(self.train_loss), format_sci(self.valid_loss))
    }
}

#[derive(Serialize)]
struct FilterSnapshot<'a> {
    epoch:   usize,
    filters: &'a [DiagnosticParameter],
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path:     PathBuf,
    filters_path: PathBuf,
}

impl MetricsLogger {
    /// Create the logger and start fresh files in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path     = dir.join("metrics.csv");
        let filters_path = dir.join("filters.jsonl");

        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "epoch,train_loss,valid_loss,learning_rate,elapsed_secs")?;

        if filters_path.exists() {
            fs::remove_file(&filters_path)
                .with_context(|| format!("Cannot reset '{}'", filters_path.display()))?;
        }

        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        Ok(Self { csv_path, filters_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6e},{:.1}",
            m.epoch,
            m.train_loss,
            m.valid_loss,
            m.learning_rate,
            m.elapsed_secs,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, valid_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.valid_loss,
        );
        Ok(())
    }

    /// Append the filter parameters of one epoch as a JSON line.
    pub fn log_filters(&self, epoch: usize, filters: &[DiagnosticParameter]) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.filters_path)
            .with_context(|| format!("Cannot open '{}'", self.filters_path.display()))?;

        let line = serde_json::to_string(&FilterSnapshot { epoch, filters })?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn filters_path(&self) -> &Path {
        &self.filters_path
    }
}

/// Scientific notation with three decimals and an exponent of at
/// least two digits: 0.001234 → "1.234e-03".
pub fn format_sci(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }

    let raw = format!("{value:.3e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => raw,
    }
}
