// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores the best model with Burn's MessagePack file
// recorder at full precision, so a reload reproduces the trained
// weights bit for bit.
//
// Files in the checkpoint directory:
//   experiment_config.json   everything needed to rebuild the model
//                            and reload the same data split
//   best_model.mpk           weights with the lowest validation loss
//
// The config is written before training starts. `evaluate`
// rebuilds the architecture from it and then loads the weights;
// the recorder refuses records that do not match the module.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::ExperimentConfig;

const CONFIG_FILE: &str = "experiment_config.json";
const MODEL_FILE:  &str = "best_model";

type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Manages the best-model checkpoint and the experiment config.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the weights file, without the recorder's extension.
    fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    /// Overwrite the best-model checkpoint.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M) -> Result<()> {
        let path = self.model_path();

        ModelRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved best model to '{}'", path.display());
        Ok(())
    }

    /// Load the best-model weights into `model`, which must have the
    /// architecture the checkpoint was saved from.
    pub fn load_model<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let path = self.model_path();
        tracing::info!("Loading best model from '{}'", path.display());

        let record = ModelRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &ExperimentConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved experiment config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<ExperimentConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'evaluate'.",
                path.display()
            )
        })?;

        let cfg: ExperimentConfig = serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::cnn::{CnnConfig, CnnRegressor};
    use crate::ml::regressor::MapRegressor;
    use burn::backend::NdArray;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cosmo-ckpt-{tag}-{}", std::process::id()))
    }

    #[test]
    fn test_model_round_trip_restores_weights() {
        let dir    = temp_dir("model");
        let ckpt   = CheckpointManager::new(&dir).unwrap();
        let device = Default::default();
        let cfg    = CnnConfig::new(1, 2, 4, 0.0, 8);

        let trained: CnnRegressor<NdArray> = cfg.init(&device);
        ckpt.save_model::<NdArray, _>(&trained).unwrap();

        // A freshly initialised model reproduces the trained outputs exactly
        let loaded = ckpt.load_model::<NdArray, _>(cfg.init::<NdArray>(&device), &device).unwrap();

        let x = Tensor::<NdArray, 4>::ones([1, 1, 8, 8], &device);
        let out = |m: &CnnRegressor<NdArray>| -> Vec<f32> {
            m.forward(x.clone()).into_data().to_vec().unwrap()
        };
        assert_eq!(out(&loaded), out(&trained));
        assert!(dir.join("best_model.mpk").exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_round_trip() {
        let dir  = temp_dir("config");
        let ckpt = CheckpointManager::new(&dir).unwrap();

        let cfg = ExperimentConfig::example(&dir);
        ckpt.save_config(&cfg).unwrap();
        let loaded = ckpt.load_config().unwrap();
        assert_eq!(loaded, cfg);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir  = temp_dir("missing");
        let ckpt = CheckpointManager::new(&dir).unwrap();
        assert!(ckpt.load_config().is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
