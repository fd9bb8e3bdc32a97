// ============================================================
// Layer 2 - EvaluateUseCase
// ============================================================
// Re-runs the test evaluation of a finished training run:
//
//   Step 1: Read experiment_config.json      (Layer 6 - infra)
//   Step 2: Reload the data and the split    (Layer 4 - data)
//   Step 3: Rebuild the architecture         (Layer 5 - ml)
//   Step 4: Load the best-model weights      (Layer 6 - infra)
//   Step 5: Test set, summary and plots      (Layer 5 + 6)
//
// The same seed gives the same simulation split, so the test
// maps are the ones the model never saw during training.
// No autodiff is needed, so the plain backends are used.

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};
use std::path::PathBuf;

use crate::application::train_use_case::{test_and_report, ExperimentConfig, PreparedData, RunReport};
use crate::domain::architecture::{Accelerator, Architecture};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    builder::{self, check_geometry},
    context::ExecutionContext,
    regressor::MapRegressor,
};

pub struct EvaluateUseCase {
    checkpoint_dir: PathBuf,
    accelerator:    Option<Accelerator>,
    plot_dir:       Option<PathBuf>,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), accelerator: None, plot_dir: None }
    }

    /// Run on a different backend than the one used for training.
    pub fn with_accelerator(mut self, accelerator: Option<Accelerator>) -> Self {
        self.accelerator = accelerator;
        self
    }

    /// Write the plots somewhere other than the saved plot directory.
    pub fn with_plot_dir(mut self, plot_dir: Option<PathBuf>) -> Self {
        self.plot_dir = plot_dir;
        self
    }

    pub fn execute(&self) -> Result<RunReport> {
        let ckpt    = CheckpointManager::new(self.checkpoint_dir.clone())?;
        let mut cfg = ckpt.load_config()?;
        if let Some(dir) = &self.plot_dir {
            cfg.plot_dir = dir.clone();
        }

        match self.accelerator.unwrap_or(cfg.accelerator) {
            Accelerator::Wgpu => execute_on::<Wgpu>(&cfg, &ckpt, WgpuDevice::default()),
            Accelerator::Cpu  => execute_on::<NdArray>(&cfg, &ckpt, NdArrayDevice::default()),
        }
    }
}

fn execute_on<B: Backend>(cfg: &ExperimentConfig, ckpt: &CheckpointManager, device: B::Device) -> Result<RunReport> {
    let ctx = ExecutionContext::<B>::new(device);
    tracing::info!("Evaluating '{}' on device {:?}", ckpt.dir().display(), ctx.device());

    let data     = PreparedData::load(cfg)?;
    let geometry = data.geometry();
    check_geometry(cfg, geometry)?;

    let device = ctx.device();
    match cfg.architecture {
        Architecture::Scattering => {
            let model = builder::scattering_hybrid::<B>(cfg, geometry, device);
            restore_and_test(cfg, &ctx, ckpt, model, &data)
        }
        Architecture::Vit => {
            let model = builder::vit::<B>(cfg, geometry, device);
            restore_and_test(cfg, &ctx, ckpt, model, &data)
        }
        Architecture::Cnn => {
            let model = builder::cnn::<B>(cfg, geometry, device);
            restore_and_test(cfg, &ctx, ckpt, model, &data)
        }
    }
}

fn restore_and_test<B, M>(
    cfg:   &ExperimentConfig,
    ctx:   &ExecutionContext<B>,
    ckpt:  &CheckpointManager,
    model: M,
    data:  &PreparedData,
) -> Result<RunReport>
where
    B: Backend,
    M: MapRegressor<B>,
{
    let model = ckpt.load_model::<B, M>(model, ctx.device())?;
    test_and_report(cfg, ctx, &model, data)
}
