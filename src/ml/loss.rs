// ============================================================
// Layer 5 - Heteroscedastic Loss
// ============================================================
// The network predicts a mean for each target parameter and,
// in the 4- and 12-feature modes, a standard deviation too.
//
//   residual² = (y_NN - y)²                       [N, G]
//   loss1     = mean_batch(residual²)             [G]
//   loss2     = mean_batch((residual² - e_NN²)²)  [G]
//
//   loss = mean_G( log(loss1) + log(loss2) )   with uncertainty
//   loss = mean_G( log(loss1) )                means only
//
// loss1 drives the means; loss2 asks the predicted spread to
// match the observed residual magnitude. Taking logs balances
// parameters whose errors live on very different scales.
//
// Both terms are clamped to LOSS_FLOOR before the log so a
// perfect fit yields a large negative loss instead of -inf.

use anyhow::Result;
use burn::prelude::*;

use crate::domain::target_schema::TargetSchema;

/// Smallest value fed to `log`.
pub const LOSS_FLOOR: f64 = 1e-12;

/// Loss of one mini-batch.
pub struct BatchLoss<B: Backend> {
    /// Scalar to backpropagate, shape [1]
    pub loss:  Tensor<B, 1>,
    /// Per-target mean squared residual, shape [G]
    pub loss1: Tensor<B, 1>,
    /// Per-target calibration error, shape [G], uncertainty modes only
    pub loss2: Option<Tensor<B, 1>>,
}

/// Compute the heteroscedastic loss of `output` ([N, features])
/// against normalised labels `params` ([N, 6]).
pub fn heteroscedastic_loss<B: Backend>(
    output: Tensor<B, 2>,
    params: Tensor<B, 2>,
    schema: &TargetSchema,
) -> BatchLoss<B> {
    let [n, _] = output.dims();
    let g      = schema.means();
    let num_g  = g.len();

    let y_nn = output.clone().slice([0..n, g.clone()]);
    let y    = params.slice([0..n, g]);

    let residual_sq = (y_nn - y).powf_scalar(2.0);
    let loss1 = residual_sq.clone().mean_dim(0).reshape([num_g]);
    let log1  = loss1.clone().clamp_min(LOSS_FLOOR).log();

    match schema.uncertainties() {
        Some(h) => {
            let e_nn  = output.slice([0..n, h]);
            let loss2 = (residual_sq - e_nn.powf_scalar(2.0))
                .powf_scalar(2.0)
                .mean_dim(0)
                .reshape([num_g]);
            let log2 = loss2.clone().clamp_min(LOSS_FLOOR).log();
            BatchLoss { loss: (log1 + log2).mean(), loss1, loss2: Some(loss2) }
        }
        None => BatchLoss { loss: log1.mean(), loss1, loss2: None },
    }
}

/// Copy a small 1D tensor to the host.
pub fn to_host<B: Backend>(t: Tensor<B, 1>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

// ─── Epoch Accumulator ────────────────────────────────────────────────────────
/// Batch-size weighted running sums of loss1 and loss2 over one epoch.
#[derive(Debug, Clone)]
pub struct LossAccumulator {
    loss1: Vec<f64>,
    loss2: Option<Vec<f64>>,
    count: usize,
}

impl LossAccumulator {
    pub fn new(schema: &TargetSchema) -> Self {
        let g = schema.num_targets();
        Self {
            loss1: vec![0.0; g],
            loss2: schema.has_uncertainty().then(|| vec![0.0; g]),
            count: 0,
        }
    }

    /// Add one batch's per-target means, weighted by its size.
    pub fn add(&mut self, loss1: &[f32], loss2: Option<&[f32]>, batch_size: usize) {
        let w = batch_size as f64;
        for (acc, &v) in self.loss1.iter_mut().zip(loss1) {
            *acc += v as f64 * w;
        }
        if let (Some(acc2), Some(l2)) = (self.loss2.as_mut(), loss2) {
            for (acc, &v) in acc2.iter_mut().zip(l2) {
                *acc += v as f64 * w;
            }
        }
        self.count += batch_size;
    }

    /// Pull a batch loss to the host and add it.
    pub fn add_batch<B: Backend>(&mut self, batch: &BatchLoss<B>, batch_size: usize) -> Result<()> {
        let l1 = to_host(batch.loss1.clone())?;
        let l2 = match &batch.loss2 {
            Some(t) => Some(to_host(t.clone())?),
            None    => None,
        };
        self.add(&l1, l2.as_deref(), batch_size);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Per-target epoch mean of loss1.
    pub fn mean_loss1(&self) -> Vec<f64> {
        let n = self.count.max(1) as f64;
        self.loss1.iter().map(|v| v / n).collect()
    }

    /// Per-target epoch mean of loss2, uncertainty modes only.
    pub fn mean_loss2(&self) -> Option<Vec<f64>> {
        let n = self.count.max(1) as f64;
        self.loss2.as_ref().map(|l| l.iter().map(|v| v / n).collect())
    }

    /// mean_G( log(Σloss1/n) [+ log(Σloss2/n)] ); NaN for an empty epoch.
    pub fn epoch_loss(&self) -> f64 {
        if self.count == 0 || self.loss1.is_empty() {
            return f64::NAN;
        }
        let floor_log = |v: f64| v.max(LOSS_FLOOR).ln();
        let g = self.loss1.len() as f64;

        let mut total: f64 = self.mean_loss1().into_iter().map(floor_log).sum();
        if let Some(l2) = self.mean_loss2() {
            total += l2.into_iter().map(floor_log).sum::<f64>();
        }
        total / g
    }
}
