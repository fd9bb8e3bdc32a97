// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates the full experiment in order:
//
//   Step 1: Validate the config               (Layer 2)
//   Step 2: Pick backend + device, seed it    (Layer 5 - ml)
//   Step 3: Load maps and parameters          (Layer 4 - data)
//   Step 4: Split simulations 90/5/5          (Layer 4 - data)
//   Step 5: Save config for `evaluate`        (Layer 6 - infra)
//   Step 6: Build the model                   (Layer 5 - ml)
//   Step 7: Train with validation             (Layer 5 - ml)
//   Step 8: Keep the best-epoch model         (Layer 5 - ml)
//   Step 9: Evaluate on the test split        (Layer 5 - ml)
//   Step 10: Render plots                     (Layer 6 - infra)

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    dataset::MapDataset,
    loader::{FieldSpec, NpyMapLoader},
    splitter::{SimulationSplit, Split},
};
use crate::domain::{
    architecture::{Accelerator, Architecture, HeadKind},
    simulation::SimulationSuite,
    target_schema::FeatureCount,
    traits::SimulationSource,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    plots,
};
use crate::ml::{
    builder::{self, check_geometry, MapGeometry},
    context::ExecutionContext,
    evaluator::{self, EvaluationSummary},
    regressor::{LearnableFilters, MapRegressor},
    scattering::FilterLearningRates,
    trainer,
};

// ─── Experiment Configuration ─────────────────────────────────────────────────
// Every option of a run. Saved as experiment_config.json so
// `evaluate` can rebuild the same model and the same split.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatteringOptions {
    /// 1 or 2
    pub order:        usize,
    /// J
    pub scales:       usize,
    /// L
    pub orientations: usize,
    /// Train the filter parameters or keep the initial Morlet bank
    pub learnable:    bool,
    pub head:         HeadKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitOptions {
    pub patch_size: usize,
    pub d_model:    usize,
    pub num_heads:  usize,
    pub num_layers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataOptions {
    /// One entry per channel
    pub fields:                   Vec<FieldSpec>,
    pub params_path:              PathBuf,
    pub maps_per_sim:             usize,
    pub materialize_augmentation: bool,
    /// `false` removes each map's mean after normalisation
    #[serde(default = "keep_monopole_default")]
    pub keep_monopole:            bool,
}

fn keep_monopole_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub architecture:   Architecture,
    pub features:       FeatureCount,
    pub hidden:         usize,
    pub dropout:        f64,
    pub lr:             f64,
    pub weight_decay:   f64,
    pub filter_lr:      FilterLearningRates,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub num_workers:    usize,
    pub seed:           u64,
    pub scattering:     ScatteringOptions,
    pub vit:            VitOptions,
    pub data:           DataOptions,
    pub checkpoint_dir: PathBuf,
    pub plot_dir:       PathBuf,
    pub accelerator:    Accelerator,
}

impl ExperimentConfig {
    /// Reject values no run could succeed with. Geometry-dependent
    /// checks happen once the maps are loaded (see `check_geometry`).
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if self.epochs == 0 {
            bail!("epoch count must be at least 1");
        }
        if self.num_workers == 0 {
            bail!("worker count must be at least 1");
        }
        if self.hidden == 0 {
            bail!("hidden width must be at least 1");
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            bail!("learning rate must be positive, got {}", self.lr);
        }
        if !(self.weight_decay >= 0.0) {
            bail!("weight decay must be non-negative, got {}", self.weight_decay);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }

        let f = &self.filter_lr;
        if [f.orientation, f.frequency, f.scale, f.slant].iter().any(|lr| !(*lr >= 0.0)) {
            bail!("filter learning rates must be non-negative");
        }

        let s = &self.scattering;
        if !(1..=2).contains(&s.order) {
            bail!("scattering order must be 1 or 2, got {}", s.order);
        }
        if s.scales == 0 || s.orientations == 0 {
            bail!("scattering needs at least one scale and one orientation");
        }

        let v = &self.vit;
        if v.patch_size == 0 || v.num_heads == 0 || v.num_layers == 0 {
            bail!("vision transformer patch size, heads and layers must be positive");
        }
        if v.d_model % v.num_heads != 0 {
            bail!("d_model {} is not divisible by {} heads", v.d_model, v.num_heads);
        }

        if self.data.fields.is_empty() {
            bail!("at least one map file is required");
        }
        if self.data.maps_per_sim == 0 {
            bail!("maps per simulation must be at least 1");
        }
        Ok(())
    }

    /// Small, valid configuration for tests.
    #[cfg(test)]
    pub fn example(dir: &std::path::Path) -> Self {
        Self {
            architecture: Architecture::Scattering,
            features:     FeatureCount::Four,
            hidden:       8,
            dropout:      0.0,
            lr:           1e-3,
            weight_decay: 1e-5,
            filter_lr:    FilterLearningRates::uniform(1e-2),
            batch_size:   4,
            epochs:       1,
            num_workers:  1,
            seed:         1,
            scattering: ScatteringOptions {
                order:        2,
                scales:       2,
                orientations: 2,
                learnable:    true,
                head:         HeadKind::Cnn,
            },
            vit: VitOptions { patch_size: 4, d_model: 16, num_heads: 2, num_layers: 1 },
            data: DataOptions {
                fields: vec![FieldSpec { maps: dir.join("maps.npy"), reference: None, log10: true }],
                params_path:              dir.join("params.txt"),
                maps_per_sim:             1,
                materialize_augmentation: false,
                keep_monopole:            true,
            },
            checkpoint_dir: dir.to_path_buf(),
            plot_dir:       dir.join("plots"),
            accelerator:    Accelerator::Cpu,
        }
    }
}

// ─── Loaded Data ──────────────────────────────────────────────────────────────
/// The normalised suite and its simulation split.
pub struct PreparedData {
    pub suite: SimulationSuite,
    pub split: SimulationSplit,
    /// Seeds the training-view draws
    pub seed:  u64,
}

impl PreparedData {
    pub fn load(cfg: &ExperimentConfig) -> Result<Self> {
        let loader = NpyMapLoader::new(
            cfg.data.fields.clone(),
            cfg.data.params_path.clone(),
            cfg.data.maps_per_sim,
        )
        .with_monopole(cfg.data.keep_monopole);
        let suite = loader.load_suite()?;
        if suite.height != suite.width {
            bail!("maps must be square, got {}x{}", suite.height, suite.width);
        }

        let split = SimulationSplit::new(suite.num_sims(), cfg.seed);
        for which in [Split::Train, Split::Valid, Split::Test] {
            if split.sims(which).is_empty() {
                bail!(
                    "{} simulations leave the {} split empty",
                    suite.num_sims(), which
                );
            }
        }
        tracing::info!(
            "Loaded {} simulations ({} maps of {}x{}, {} channels)",
            suite.num_sims(), suite.num_maps, suite.height, suite.width, suite.channels
        );
        Ok(Self { suite, split, seed: cfg.seed })
    }

    pub fn geometry(&self) -> MapGeometry {
        MapGeometry { channels: self.suite.channels, image_size: self.suite.height }
    }

    pub fn dataset(&self, which: Split, materialize: bool) -> Result<MapDataset> {
        MapDataset::from_suite(&self.suite, &self.split, which, materialize, self.seed)
    }
}

// ─── Run Report ───────────────────────────────────────────────────────────────
/// What the CLI prints after a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub architecture:   Architecture,
    pub training_hours: Option<f64>,
    pub best_epoch:     Option<usize>,
    pub test_loss:      f64,
    pub test_samples:   usize,
    pub summary:        EvaluationSummary,
    pub plots:          Vec<PathBuf>,
}

/// Evaluate `model` on the test split, summarise and plot.
pub fn test_and_report<B, M>(
    cfg:   &ExperimentConfig,
    ctx:   &ExecutionContext<B>,
    model: &M,
    data:  &PreparedData,
) -> Result<RunReport>
where
    B: Backend,
    M: MapRegressor<B>,
{
    let test_dataset = data.dataset(Split::Test, false)?;
    let test_samples = test_dataset.sample_count();

    let evaluation = evaluator::evaluate(
        model,
        ctx,
        test_dataset,
        &cfg.features.schema(),
        cfg.batch_size,
        cfg.num_workers,
    )?;
    let summary = evaluator::summarize(&evaluation.predictions);
    let plots   = plots::render_all(&cfg.plot_dir, &summary)?;
    tracing::info!("Wrote {} plots to '{}'", plots.len(), cfg.plot_dir.display());

    Ok(RunReport {
        architecture:   cfg.architecture,
        training_hours: None,
        best_epoch:     None,
        test_loss:      evaluation.test_loss,
        test_samples,
        summary,
        plots,
    })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: ExperimentConfig,
}

impl TrainUseCase {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Execute the full pipeline end to end.
    pub fn execute(&self) -> Result<RunReport> {
        self.config.validate()?;
        match self.config.accelerator {
            Accelerator::Wgpu => self.execute_on::<Autodiff<Wgpu>>(WgpuDevice::default()),
            Accelerator::Cpu  => self.execute_on::<Autodiff<NdArray>>(NdArrayDevice::default()),
        }
    }

    fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<RunReport> {
        let cfg = &self.config;

        // ── Steps 2-4: device, data, split ───────────────────────────────────
        let ctx = ExecutionContext::<B>::seeded(device, cfg.seed);
        tracing::info!("Using device: {:?}", ctx.device());

        let data     = PreparedData::load(cfg)?;
        let geometry = data.geometry();
        check_geometry(cfg, geometry)?;

        // ── Step 5: save config for `evaluate` ───────────────────────────────
        let ckpt    = CheckpointManager::new(cfg.checkpoint_dir.clone())?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
        ckpt.save_config(cfg)?;

        // ── Steps 6-10 per architecture ──────────────────────────────────────
        tracing::info!("Building {} model with {} outputs", cfg.architecture, cfg.features.get());
        let device = ctx.device();
        match cfg.architecture {
            Architecture::Scattering => {
                let model = builder::scattering_hybrid::<B>(cfg, geometry, device);
                self.fit(&ctx, model, &data, &ckpt, &metrics)
            }
            Architecture::Vit => {
                let model = builder::vit::<B>(cfg, geometry, device);
                self.fit(&ctx, model, &data, &ckpt, &metrics)
            }
            Architecture::Cnn => {
                let model = builder::cnn::<B>(cfg, geometry, device);
                self.fit(&ctx, model, &data, &ckpt, &metrics)
            }
        }
    }

    fn fit<B, M>(
        &self,
        ctx:     &ExecutionContext<B>,
        model:   M,
        data:    &PreparedData,
        ckpt:    &CheckpointManager,
        metrics: &MetricsLogger,
    ) -> Result<RunReport>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + MapRegressor<B> + LearnableFilters<B>,
        M::InnerModule: MapRegressor<B::InnerBackend>,
    {
        let cfg = &self.config;

        // ── Step 7: train ────────────────────────────────────────────────────
        let train_dataset = data.dataset(Split::Train, cfg.data.materialize_augmentation)?;
        let valid_dataset = data.dataset(Split::Valid, false)?;
        let outcome = trainer::train(cfg, ctx, model, train_dataset, valid_dataset, ckpt, metrics)?;

        // ── Step 8: the best model is the one the trainer kept in memory ─────
        if outcome.best_epoch.is_none() {
            tracing::warn!("Validation loss never improved; evaluating the last model");
        }

        // ── Steps 9-10: test + plots, without autodiff ───────────────────────
        let inner_ctx = ExecutionContext::<B::InnerBackend>::new(ctx.device().clone());
        let mut report = test_and_report(cfg, &inner_ctx, &outcome.model.valid(), data)?;
        report.training_hours = Some(outcome.hours);
        report.best_epoch     = outcome.best_epoch;
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parameters::NUM_PARAMETERS;
    use ndarray::Array3;
    use ndarray_npy::write_npy;
    use std::fs;

    fn write_suite(dir: &std::path::Path, num_sims: usize, side: usize) {
        fs::create_dir_all(dir).unwrap();
        let maps = Array3::<f32>::from_shape_fn((num_sims, side, side), |(m, i, j)| {
            1.0 + (m * 7 + i * 3 + j) as f32 % 11.0
        });
        write_npy(dir.join("maps.npy"), &maps).unwrap();

        let rows: String = (0..num_sims)
            .map(|s| {
                let t = s as f32 / num_sims as f32;
                format!("{} {} 1.0 1.0 1.0 1.0\n", 0.1 + 0.4 * t, 0.6 + 0.4 * t)
            })
            .collect();
        fs::write(dir.join("params.txt"), rows).unwrap();
    }

    #[test]
    fn test_example_config_is_valid_and_serialisable() {
        let cfg = ExperimentConfig::example(std::path::Path::new("run"));
        cfg.validate().unwrap();

        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"features\":4"));
        assert!(json.contains("\"architecture\":\"scattering\""));
        let back: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_unsupported_feature_count_is_rejected() {
        let cfg  = ExperimentConfig::example(std::path::Path::new("run"));
        let json = serde_json::to_string(&cfg).unwrap().replace("\"features\":4", "\"features\":5");
        assert!(serde_json::from_str::<ExperimentConfig>(&json).is_err());
    }

    #[test]
    fn test_validation_catches_bad_values() {
        let base = ExperimentConfig::example(std::path::Path::new("run"));

        let mut c = base.clone();
        c.batch_size = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.scattering.order = 3;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.vit.num_heads = 3;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.data.fields.clear();
        assert!(c.validate().is_err());

        let mut c = base;
        c.dropout = 1.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_prepared_data_needs_every_split() {
        let dir = std::env::temp_dir().join(format!("cosmo-prep-{}", std::process::id()));
        write_suite(&dir, 5, 8);
        let cfg = ExperimentConfig::example(&dir);
        assert!(PreparedData::load(&cfg).is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_pipeline_on_cpu() {
        let dir = std::env::temp_dir().join(format!("cosmo-pipeline-{}", std::process::id()));
        write_suite(&dir, 40, 8);

        let mut cfg = ExperimentConfig::example(&dir);
        cfg.architecture = Architecture::Cnn;
        cfg.features     = FeatureCount::Twelve;
        cfg.epochs       = 2;

        let report = TrainUseCase::new(cfg.clone()).execute().unwrap();

        assert_eq!(report.summary.reports.len(), NUM_PARAMETERS);
        assert_eq!(report.plots.len(), NUM_PARAMETERS);
        assert!(report.training_hours.is_some());
        assert!(report.test_samples > 0);
        assert!(report.summary.reports.iter().all(|r| r.bayesian_error.is_some()));
        assert!(dir.join("experiment_config.json").exists());
        assert!(dir.join("metrics.csv").exists());

        fs::remove_dir_all(&dir).ok();
    }
}
