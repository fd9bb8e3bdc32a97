// ============================================================
// Layer 5 - Test-Set Evaluator
// ============================================================
// Runs a trained model over the test split in evaluation mode
// and keeps every prediction:
//
//   truth       y[:, g]      normalised true values
//   prediction  out[:, g]    normalised predicted means
//   spread      out[:, h]    normalised predicted std (4/12 modes)
//
// The buffers are sized from the dataset length up front and
// filled at a running offset.
//
// `summarize` then maps everything back to physical units:
//
//   value = x·(max − min) + min
//   σ     = e·(max − min)              (a spread has no offset)
//
//   percent error  = 100·mean(|truth − pred| / truth)
//   bayesian error = 100·|mean(σ / pred)|
//
// The network is free to emit a negative e; plots use |σ|.

use anyhow::{bail, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    prelude::*,
};

use crate::data::{batcher::MapBatcher, dataset::MapDataset};
use crate::domain::parameters::CosmoParameter;
use crate::domain::target_schema::TargetSchema;
use crate::ml::context::ExecutionContext;
use crate::ml::loss::{heteroscedastic_loss, LossAccumulator};
use crate::ml::regressor::MapRegressor;

/// Raw normalised predictions over the whole test set, row-major [n, G].
#[derive(Debug, Clone)]
pub struct TestPredictions {
    pub schema:      TargetSchema,
    pub num_samples: usize,
    pub truth:       Vec<f32>,
    pub prediction:  Vec<f32>,
    pub spread:      Option<Vec<f32>>,
}

impl TestPredictions {
    /// Zero-filled buffers for `num_samples` rows.
    pub fn with_capacity(schema: TargetSchema, num_samples: usize) -> Self {
        let len = num_samples * schema.num_targets();
        Self {
            spread:     schema.has_uncertainty().then(|| vec![0.0; len]),
            truth:      vec![0.0; len],
            prediction: vec![0.0; len],
            num_samples,
            schema,
        }
    }
}

/// Test loss plus the retained predictions.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub test_loss:   f64,
    pub predictions: TestPredictions,
}

/// One test sample of one parameter, in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionPoint {
    pub truth:      f64,
    pub prediction: f64,
    pub sigma:      Option<f64>,
}

/// Per-parameter error summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterReport {
    pub parameter:      CosmoParameter,
    pub percent_error:  f64,
    pub bayesian_error: Option<f64>,
}

/// Everything the reporter needs.
#[derive(Debug, Clone)]
pub struct EvaluationSummary {
    pub reports: Vec<ParameterReport>,
    pub points:  Vec<(CosmoParameter, Vec<PredictionPoint>)>,
}

fn host_matrix<B: Backend>(t: Tensor<B, 2>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

/// Run `model` over `dataset` (no augmentation, no shuffling).
pub fn evaluate<B, M>(
    model:       &M,
    ctx:         &ExecutionContext<B>,
    dataset:     MapDataset,
    schema:      &TargetSchema,
    batch_size:  usize,
    num_workers: usize,
) -> Result<Evaluation>
where
    B: Backend,
    M: MapRegressor<B>,
{
    let num_samples = dataset.sample_count();
    if num_samples == 0 {
        bail!("test set is empty");
    }

    let side    = dataset.side();
    let batcher = MapBatcher::<B>::new(ctx.device().clone(), dataset.channels(), side, side);
    let loader  = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .num_workers(num_workers)
        .build(dataset);

    let g = schema.means();
    let num_g = g.len();

    let mut predictions = TestPredictions::with_capacity(schema.clone(), num_samples);
    let mut accumulator = LossAccumulator::new(schema);
    let mut offset      = 0usize;

    for batch in loader.iter() {
        let n      = batch.batch_size();
        let output = model.forward(batch.maps);

        let y_nn = output.clone().slice([0..n, g.clone()]);
        let y    = batch.params.clone().slice([0..n, g.clone()]);

        let rows = offset * num_g..(offset + n) * num_g;
        predictions.prediction[rows.clone()].copy_from_slice(&host_matrix(y_nn)?);
        predictions.truth[rows.clone()].copy_from_slice(&host_matrix(y)?);
        if let (Some(spread), Some(h)) = (predictions.spread.as_mut(), schema.uncertainties()) {
            let e_nn = output.clone().slice([0..n, h]);
            spread[rows].copy_from_slice(&host_matrix(e_nn)?);
        }

        let batch_loss = heteroscedastic_loss(output, batch.params, schema);
        accumulator.add_batch(&batch_loss, n)?;
        offset += n;
    }

    if offset != num_samples {
        bail!("test loader produced {offset} samples, expected {num_samples}");
    }

    let test_loss = accumulator.epoch_loss();
    tracing::info!("Test loss over {} samples: {:.4}", num_samples, test_loss);
    Ok(Evaluation { test_loss, predictions })
}

/// De-normalise and compute per-parameter errors.
pub fn summarize(predictions: &TestPredictions) -> EvaluationSummary {
    let params = predictions.schema.parameters();
    let num_g  = params.len();

    let mut reports = Vec::with_capacity(num_g);
    let mut points  = Vec::with_capacity(num_g);

    for (col, &param) in params.iter().enumerate() {
        let column: Vec<PredictionPoint> = (0..predictions.num_samples)
            .map(|row| {
                let i = row * num_g + col;
                PredictionPoint {
                    truth:      param.denormalize(predictions.truth[i] as f64),
                    prediction: param.denormalize(predictions.prediction[i] as f64),
                    sigma:      predictions
                        .spread
                        .as_ref()
                        .map(|s| param.denormalize_spread(s[i] as f64)),
                }
            })
            .collect();

        let n = column.len().max(1) as f64;
        let percent_error = 100.0
            * column.iter().map(|p| (p.truth - p.prediction).abs() / p.truth).sum::<f64>()
            / n;
        let bayesian_error = predictions.spread.as_ref().map(|spread| {
            let relative: f64 = column
                .iter()
                .enumerate()
                .map(|(row, p)| param.span() * spread[row * num_g + col] as f64 / p.prediction)
                .sum();
            100.0 * (relative / n).abs()
        });

        reports.push(ParameterReport { parameter: param, percent_error, bayesian_error });
        points.push((param, column));
    }

    EvaluationSummary { reports, points }
}
