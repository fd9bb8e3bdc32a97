// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and AdamW,
// generic over the architecture.
//
//   - Training runs on B (an AutodiffBackend), dropout active
//   - model.valid() returns the model on B::InnerBackend, with
//     dropout and batch-norm updates off
//   - The validation batcher must also produce InnerBackend tensors
//
// Per batch:
//   loss   = heteroscedastic_loss(model(x), y)
//   grads  = loss.backward()
//   filter grads (scattering only) are split off and stepped by
//   one AdamW per parameter kind with its own learning rate;
//   everything else goes through the main AdamW
//
// Per epoch:
//   valid loss drives the plateau scheduler (every learning rate
//   is multiplied by its scale) and the best-model checkpoint.

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};
use std::time::Instant;

use crate::application::train_use_case::ExperimentConfig;
use crate::data::{batcher::MapBatcher, dataset::MapDataset};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::context::ExecutionContext;
use crate::ml::loss::{heteroscedastic_loss, LossAccumulator};
use crate::ml::regressor::{LearnableFilters, MapRegressor};
use crate::ml::scattering::FilterParam;
use crate::ml::scheduler::PlateauScheduler;

/// Result of a finished run.
pub struct TrainingOutcome<M> {
    /// Model with the lowest validation loss (the last one if none improved)
    pub model:           M,
    pub best_valid_loss: f64,
    pub best_epoch:      Option<usize>,
    pub history:         Vec<EpochMetrics>,
    pub hours:           f64,
}

pub fn train<B, M>(
    cfg:           &ExperimentConfig,
    ctx:           &ExecutionContext<B>,
    model:         M,
    train_dataset: MapDataset,
    valid_dataset: MapDataset,
    ckpt:          &CheckpointManager,
    metrics:       &MetricsLogger,
) -> Result<TrainingOutcome<M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + MapRegressor<B> + LearnableFilters<B>,
    M::InnerModule: MapRegressor<B::InnerBackend>,
{
    let schema = cfg.features.schema();
    let device = ctx.device().clone();
    let mut model = model;

    // ── Optimisers ────────────────────────────────────────────────────────────
    // AdamW: Adam with weight decay decoupled from the gradient
    //   θ = θ - lr * (m / (√v + ε) + λ θ)
    // β1 = 0.5 keeps the first moment short-lived
    let adamw = AdamWConfig::new()
        .with_beta_1(0.5)
        .with_beta_2(0.999)
        .with_weight_decay(cfg.weight_decay as f32);
    let mut optim = adamw.init::<B, M>();
    let mut filter_optims: Vec<_> = FilterParam::ALL
        .iter()
        .map(|&kind| (kind, adamw.init::<B, M>()))
        .collect();

    let mut scheduler = PlateauScheduler::default();

    // ── Data loaders ──────────────────────────────────────────────────────────
    let (channels, side) = (train_dataset.channels(), train_dataset.side());

    let train_batcher = MapBatcher::<B>::new(device.clone(), channels, side, side);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    let valid_batcher = MapBatcher::<B::InnerBackend>::new(device.clone(), channels, side, side);
    let valid_loader  = DataLoaderBuilder::new(valid_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(valid_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let start = Instant::now();
    let mut best_valid = f64::INFINITY;
    let mut best_epoch = None;
    let mut best_model: Option<M> = None;
    let mut history = Vec::with_capacity(cfg.epochs);

    for epoch in 1..=cfg.epochs {
        let scale = scheduler.scale();
        let lr    = cfg.lr * scale;

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_acc = LossAccumulator::new(&schema);
        let mut batches   = 0usize;

        for batch in train_loader.iter() {
            let n          = batch.batch_size();
            let output     = model.forward(batch.maps);
            let batch_loss = heteroscedastic_loss(output, batch.params, &schema);
            train_acc.add_batch(&batch_loss, n)?;
            batches += 1;

            let mut grads    = batch_loss.loss.backward();
            let filter_grads = model.take_filter_grads(&mut grads);
            let grads        = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);

            if cfg.scattering.learnable {
                for (kind, grads) in filter_grads {
                    if let Some((_, opt)) = filter_optims.iter_mut().find(|(k, _)| *k == kind) {
                        model = opt.step(cfg.filter_lr.get(kind) * scale, model, grads);
                    }
                }
            }
        }
        tracing::debug!("Epoch {}: {} training batches", epoch, batches);

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let mut valid_acc = LossAccumulator::new(&schema);

        for batch in valid_loader.iter() {
            let n          = batch.batch_size();
            let output     = model_valid.forward(batch.maps);
            let batch_loss = heteroscedastic_loss(output, batch.params, &schema);
            valid_acc.add_batch(&batch_loss, n)?;
        }

        let train_loss = train_acc.epoch_loss();
        let valid_loss = valid_acc.epoch_loss();

        if scheduler.step(valid_loss) {
            tracing::info!(
                "Validation loss plateaued: learning rate scale now {:.3e}",
                scheduler.scale()
            );
        }

        let record = EpochMetrics::new(epoch, train_loss, valid_loss, lr, start.elapsed().as_secs_f64());

        let mut line = record.console_line();
        if record.is_improvement(best_valid) {
            best_valid = valid_loss;
            best_epoch = Some(epoch);
            ckpt.save_model::<B, M>(&model)?;
            best_model = Some(model.clone());
            line.push_str(" (C)");
        }
        println!("{line}");

        metrics.log(&record)?;
        if let Some(source) = model_valid.diagnostics() {
            let filters = source.diagnostic_parameters()?;
            for f in &filters {
                tracing::info!("epoch {} {}: {:?}", epoch, f.name, f.values);
            }
            metrics.log_filters(epoch, &filters)?;
        }
        history.push(record);
    }

    let hours = start.elapsed().as_secs_f64() / 3600.0;
    tracing::info!(
        "Training complete in {:.4} h, best validation loss {:.4} (epoch {:?})",
        hours, best_valid, best_epoch
    );

    Ok(TrainingOutcome {
        model: best_model.unwrap_or(model),
        best_valid_loss: best_valid,
        best_epoch,
        history,
        hours,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{Augmentation, MapSample};
    use crate::domain::architecture::HeadKind;
    use crate::domain::parameters::NUM_PARAMETERS;
    use crate::domain::target_schema::FeatureCount;
    use crate::ml::cnn::CnnConfig;
    use crate::ml::scattering::{attach_head, ScatteringConfig};
    use burn::backend::{Autodiff, NdArray};
    use burn::module::Param;
    use std::path::PathBuf;

    type B = Autodiff<NdArray>;

    fn dataset(n: usize, side: usize) -> MapDataset {
        let samples = (0..n)
            .map(|i| MapSample {
                map:    (0..side * side).map(|p| ((i + p) % 5) as f32 * 0.1).collect(),
                params: [0.5; NUM_PARAMETERS],
            })
            .collect();
        MapDataset::new(samples, 1, side, Augmentation::None)
    }

    fn run_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cosmo-train-{tag}-{}", std::process::id()))
    }

    #[test]
    fn test_two_epochs_stay_finite() {
        let dir = run_dir("cnn");
        let mut cfg = ExperimentConfig::example(&dir);
        cfg.features   = FeatureCount::Two;
        cfg.epochs     = 2;
        cfg.batch_size = 2;

        let ctx     = ExecutionContext::<B>::seeded(Default::default(), 7);
        let model   = CnnConfig::new(1, 2, 4, 0.0, 8).init::<B>(ctx.device());
        let ckpt    = CheckpointManager::new(&dir).unwrap();
        let metrics = MetricsLogger::new(&dir).unwrap();

        let out = train(&cfg, &ctx, model, dataset(4, 8), dataset(4, 8), &ckpt, &metrics).unwrap();

        assert_eq!(out.history.len(), 2);
        for m in &out.history {
            assert!(m.train_loss.is_finite(), "train loss {}", m.train_loss);
            assert!(m.valid_loss.is_finite(), "valid loss {}", m.valid_loss);
        }
        assert!(out.best_epoch.is_some());
        assert!(dir.join("best_model.mpk").exists());
        assert_eq!(std::fs::read_to_string(metrics.csv_path()).unwrap().lines().count(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_residual_losses_sit_on_the_floor() {
        let dir = run_dir("floor");
        let mut cfg = ExperimentConfig::example(&dir);
        cfg.features   = FeatureCount::Two;
        cfg.epochs     = 2;
        cfg.batch_size = 2;

        // Output is the bias alone, equal to every target
        let ctx = ExecutionContext::<B>::seeded(Default::default(), 5);
        let mut model = CnnConfig::new(1, 2, 4, 0.0, 8).init::<B>(ctx.device());
        model.fc2.weight = Param::from_tensor(model.fc2.weight.val().zeros_like());
        model.fc2.bias   = model
            .fc2
            .bias
            .map(|b| Param::from_tensor(b.val().zeros_like().add_scalar(0.5)));

        let ckpt    = CheckpointManager::new(&dir).unwrap();
        let metrics = MetricsLogger::new(&dir).unwrap();
        let out = train(&cfg, &ctx, model, dataset(4, 8), dataset(4, 8), &ckpt, &metrics).unwrap();

        let floor = crate::ml::loss::LOSS_FLOOR.ln();
        assert_eq!(out.history.len(), 2);
        for m in &out.history {
            assert!((m.train_loss - floor).abs() < 1e-6, "train loss {}", m.train_loss);
            assert!((m.valid_loss - floor).abs() < 1e-6, "valid loss {}", m.valid_loss);
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_scattering_filters_move_only_when_learnable() {
        let scat = ScatteringConfig::new(1, 8).with_scales(1).with_orientations(2).with_order(1);

        let filter_values = |learnable: bool, tag: &str| {
            let dir = run_dir(tag);
            let mut cfg = ExperimentConfig::example(&dir);
            cfg.epochs = 1;
            cfg.batch_size = 2;
            cfg.scattering.learnable = learnable;
            cfg.filter_lr = crate::ml::scattering::FilterLearningRates::uniform(0.1);

            let ctx   = ExecutionContext::<B>::seeded(Default::default(), 3);
            let model = attach_head(scat.init::<B>(ctx.device()), &scat, HeadKind::Mlp, 4, 8, 0.0, ctx.device());
            let before = model.frontend.scale.val().into_data().to_vec::<f32>().unwrap();

            let ckpt    = CheckpointManager::new(&dir).unwrap();
            let metrics = MetricsLogger::new(&dir).unwrap();
            let out = train(&cfg, &ctx, model, dataset(4, 8), dataset(2, 8), &ckpt, &metrics).unwrap();
            let after = out.model.frontend.scale.val().into_data().to_vec::<f32>().unwrap();

            let logged = metrics.filters_path().exists();
            std::fs::remove_dir_all(&dir).ok();
            (before, after, logged)
        };

        let (before, after, logged) = filter_values(false, "frozen");
        assert_eq!(before, after);
        assert!(logged);

        let (before, after, _) = filter_values(true, "learnable");
        assert_ne!(before, after);
    }
}
