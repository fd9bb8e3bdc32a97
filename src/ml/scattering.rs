// ============================================================
// Layer 5 - Learnable Scattering Network
// ============================================================
// A scattering transform is a cascade of oriented band-pass
// filters followed by a complex modulus and a low-pass average.
// Here the filters are Morlet-like wavelets rebuilt at every
// forward pass from four learnable parameter vectors, one entry
// per (scale j, orientation l) filter:
//
//   orientation  θ   rotation of the wave vector
//   frequency    ξ   carrier frequency along the rotated axis
//   scale        σ   width of the Gaussian envelope
//   slant        s   aspect ratio of the envelope
//
//   x' =  x cosθ + y sinθ
//   y' = -x sinθ + y cosθ
//   ψ(x, y) = exp(-(x'² + s² y'²) / 2σ²) · (e^{iξx'} - β)
//
// β makes every filter zero-mean, so filters respond to
// structure rather than to the map's mean level.
//
//   order 0   S0 = x ⋆ φ
//   order 1   S1 = |x ⋆ ψ_λ1| ⋆ φ
//   order 2   S2 = ||x ⋆ ψ_λ1| ⋆ ψ_λ2| ⋆ φ     (j2 > j1)
//
// φ is a 2^J average pool. Initial values follow the usual
// Morlet filter bank (σ = 0.8·2^j, ξ = 3π/4 / 2^j, s = 4/L).

use std::f32::consts::PI;

use burn::{
    module::Param,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
    },
    optim::GradientsParams,
    prelude::*,
    tensor::{
        activation::leaky_relu,
        backend::AutodiffBackend,
        module::{avg_pool2d, conv2d},
        ops::ConvOptions,
    },
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::architecture::HeadKind;
use crate::domain::traits::{DiagnosticParameter, DiagnosticParameterSource};
use crate::ml::cnn::{conv_stack, ConvBlock};
use crate::ml::loss::to_host;
use crate::ml::regressor::{LearnableFilters, MapRegressor};

const MODULUS_EPS: f64 = 1e-8;
const LEAKY_SLOPE: f64 = 0.2;

// ─── Filter Parameters ────────────────────────────────────────────────────────
/// The four learnable quantities describing each filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterParam {
    Orientation,
    Frequency,
    Scale,
    Slant,
}

impl FilterParam {
    pub const ALL: [FilterParam; 4] = [
        FilterParam::Orientation,
        FilterParam::Frequency,
        FilterParam::Scale,
        FilterParam::Slant,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterParam::Orientation => "orientation",
            FilterParam::Frequency   => "frequency",
            FilterParam::Scale       => "scale",
            FilterParam::Slant       => "slant",
        }
    }
}

/// Learning rate of each filter parameter kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterLearningRates {
    pub orientation: f64,
    pub frequency:   f64,
    pub scale:       f64,
    pub slant:       f64,
}

impl FilterLearningRates {
    pub fn uniform(lr: f64) -> Self {
        Self { orientation: lr, frequency: lr, scale: lr, slant: lr }
    }

    pub fn get(&self, param: FilterParam) -> f64 {
        match param {
            FilterParam::Orientation => self.orientation,
            FilterParam::Frequency   => self.frequency,
            FilterParam::Scale       => self.scale,
            FilterParam::Slant       => self.slant,
        }
    }
}

// ─── Scattering Front-End ─────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ScatteringConfig {
    pub channels:     usize,
    pub image_size:   usize,
    /// J: number of dyadic scales
    #[config(default = 2)]
    pub scales:       usize,
    /// L: orientations per scale
    #[config(default = 4)]
    pub orientations: usize,
    /// 1 or 2
    #[config(default = 2)]
    pub order:        usize,
}

impl ScatteringConfig {
    pub fn num_filters(&self) -> usize {
        self.scales * self.orientations
    }

    /// Filter pairs (λ1, λ2) with j2 > j1, as indices into the F×F grid.
    pub fn second_order_pairs(&self) -> Vec<i32> {
        second_order_pairs(self.scales, self.orientations)
    }

    /// Output channels per input channel: 1 + F + pairs.
    pub fn coefficients_per_channel(&self) -> usize {
        let second = if self.order >= 2 { self.second_order_pairs().len() } else { 0 };
        1 + self.num_filters() + second
    }

    pub fn output_channels(&self) -> usize {
        self.channels * self.coefficients_per_channel()
    }

    /// Side of the low-passed output maps.
    pub fn output_size(&self) -> usize {
        self.image_size >> self.scales
    }

    /// Odd support wide enough for ±3σ of the widest envelope.
    pub fn kernel_size(&self) -> usize {
        let sigma_max = 0.8 * (1usize << self.scales.saturating_sub(1)) as f32;
        let half = (3.0 * sigma_max).ceil() as usize;
        let k = 2 * half + 1;
        // never wider than the map itself
        let cap = if self.image_size % 2 == 0 { self.image_size.saturating_sub(1) } else { self.image_size };
        k.min(cap.max(1))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LearnableScattering<B> {
        let mut orientation = Vec::new();
        let mut frequency   = Vec::new();
        let mut scale       = Vec::new();
        let mut slant       = Vec::new();

        for j in 0..self.scales {
            let dyadic = (1usize << j) as f32;
            for l in 0..self.orientations {
                orientation.push(PI * l as f32 / self.orientations as f32);
                frequency.push(0.75 * PI / dyadic);
                scale.push(0.8 * dyadic);
                slant.push(4.0 / self.orientations as f32);
            }
        }

        let param = |v: Vec<f32>| Param::from_tensor(Tensor::<B, 1>::from_floats(v.as_slice(), device));

        LearnableScattering {
            orientation:  param(orientation),
            frequency:    param(frequency),
            scale:        param(scale),
            slant:        param(slant),
            channels:     self.channels,
            scales:       self.scales,
            orientations: self.orientations,
            order:        self.order,
            kernel_size:  self.kernel_size(),
        }
    }
}

fn second_order_pairs(scales: usize, orientations: usize) -> Vec<i32> {
    let f = scales * orientations;
    let mut pairs = Vec::new();
    for j1 in 0..scales {
        for l1 in 0..orientations {
            for j2 in (j1 + 1)..scales {
                for l2 in 0..orientations {
                    let a = j1 * orientations + l1;
                    let b = j2 * orientations + l2;
                    pairs.push((a * f + b) as i32);
                }
            }
        }
    }
    pairs
}

/// Scattering transform with learnable Morlet filters.
#[derive(Module, Debug)]
pub struct LearnableScattering<B: Backend> {
    pub orientation:  Param<Tensor<B, 1>>,
    pub frequency:    Param<Tensor<B, 1>>,
    pub scale:        Param<Tensor<B, 1>>,
    pub slant:        Param<Tensor<B, 1>>,
    pub channels:     usize,
    pub scales:       usize,
    pub orientations: usize,
    pub order:        usize,
    pub kernel_size:  usize,
}

impl<B: Backend> LearnableScattering<B> {
    pub fn param(&self, kind: FilterParam) -> &Param<Tensor<B, 1>> {
        match kind {
            FilterParam::Orientation => &self.orientation,
            FilterParam::Frequency   => &self.frequency,
            FilterParam::Scale       => &self.scale,
            FilterParam::Slant       => &self.slant,
        }
    }

    fn num_filters(&self) -> usize {
        self.scales * self.orientations
    }

    /// Real and imaginary parts of every filter, each [F, K, K].
    pub fn filter_bank(&self) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let f      = self.num_filters();
        let k      = self.kernel_size;
        let device = self.orientation.device();
        let half   = (k / 2) as f32;

        let coords = Tensor::<B, 1, Int>::arange(0..k as i64, &device).float().sub_scalar(half);
        let xs = coords.clone().reshape([1, 1, k]).expand([f, k, k]);
        let ys = coords.reshape([1, k, 1]).expand([f, k, k]);

        let per_filter = |p: &Param<Tensor<B, 1>>| p.val().reshape([f, 1, 1]);
        let theta = per_filter(&self.orientation);
        let xi    = per_filter(&self.frequency);
        let sigma = per_filter(&self.scale);
        let slant = per_filter(&self.slant);

        let (cos, sin) = (theta.clone().cos(), theta.sin());
        let x_rot = xs.clone() * cos.clone() + ys.clone() * sin.clone();
        let y_rot = ys * cos - xs * sin;

        // exp(-(x'² + s² y'²) / 2σ²)
        let envelope = (x_rot.clone().powf_scalar(2.0) + slant.clone().powf_scalar(2.0) * y_rot.powf_scalar(2.0))
            .div(sigma.clone().powf_scalar(2.0).mul_scalar(2.0))
            .neg()
            .exp();

        let phase = x_rot * xi;
        let real  = envelope.clone() * phase.clone().cos();
        let imag  = envelope.clone() * phase.sin();

        // β = Σ(envelope · carrier) / Σ envelope, per filter
        let env_sum = envelope.clone().sum_dim(1).sum_dim(2);
        let beta_re = real.clone().sum_dim(1).sum_dim(2).div(env_sum.clone());
        let beta_im = imag.clone().sum_dim(1).sum_dim(2).div(env_sum);

        let norm = sigma.powf_scalar(2.0).mul_scalar(2.0 * PI).div(slant);
        let psi_re = (real - envelope.clone() * beta_re).div(norm.clone());
        let psi_im = (imag - envelope * beta_im).div(norm);
        (psi_re, psi_im)
    }

    /// |x ⋆ ψ| for every filter: [M, 1, H, W] → [M, F, H, W]
    fn wavelet_modulus(&self, x: Tensor<B, 4>, weight: Tensor<B, 4>) -> Tensor<B, 4> {
        let f   = self.num_filters();
        let pad = self.kernel_size / 2;
        let out = conv2d(x, weight, None, ConvOptions::new([1, 1], [pad, pad], [1, 1], 1));
        let [m, _, h, w] = out.dims();

        let re = out.clone().slice([0..m, 0..f, 0..h, 0..w]);
        let im = out.slice([0..m, f..2 * f, 0..h, 0..w]);
        (re.powf_scalar(2.0) + im.powf_scalar(2.0)).add_scalar(MODULUS_EPS).sqrt()
    }

    /// φ: 2^J average pooling.
    fn lowpass(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let s = 1usize << self.scales;
        avg_pool2d(x, [s, s], [s, s], [0, 0], true)
    }

    /// [N, C, H, W] → [N, C·(1 + F + pairs), H/2^J, W/2^J]
    pub fn forward(&self, maps: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, h, w] = maps.dims();
        let m = n * c;
        let f = self.num_filters();
        let k = self.kernel_size;

        // Channels are scattered independently
        let x = maps.reshape([m, 1, h, w]);

        let (re, im) = self.filter_bank();
        let weight = Tensor::cat(vec![re, im], 0).reshape([2 * f, 1, k, k]);

        let u1 = self.wavelet_modulus(x.clone(), weight.clone());
        let mut coefficients = vec![self.lowpass(x), self.lowpass(u1.clone())];

        let pairs = second_order_pairs(self.scales, self.orientations);
        if self.order >= 2 && !pairs.is_empty() {
            let u2 = self
                .wavelet_modulus(u1.reshape([m * f, 1, h, w]), weight)
                .reshape([m, f * f, h, w]);
            let index = Tensor::<B, 1, Int>::from_ints(pairs.as_slice(), &u2.device());
            coefficients.push(self.lowpass(u2.select(1, index)));
        }

        let s = Tensor::cat(coefficients, 1);
        let [_, per_channel, ho, wo] = s.dims();
        s.reshape([n, c * per_channel, ho, wo])
    }
}

impl<B: Backend> DiagnosticParameterSource for LearnableScattering<B> {
    fn diagnostic_parameters(&self) -> Result<Vec<DiagnosticParameter>> {
        FilterParam::ALL
            .iter()
            .map(|&kind| {
                let values = to_host(self.param(kind).val())
                    .with_context(|| format!("Cannot read filter parameter '{}'", kind.name()))?;
                Ok(DiagnosticParameter::new(kind.name(), values))
            })
            .collect()
    }
}

// ─── Heads ────────────────────────────────────────────────────────────────────
/// Trainable layers on top of the scattering coefficients.
///
///   linear  global average → linear
///   mlp     global average → hidden layer → linear
///   cnn     conv blocks → global average → hidden layer → linear
#[derive(Module, Debug)]
pub struct ScatteringHead<B: Backend> {
    pub input_norm: BatchNorm<B, 2>,
    pub convs:      Vec<ConvBlock<B>>,
    pub pool:       AdaptiveAvgPool2d,
    pub hidden:     Option<Linear<B>>,
    pub dropout:    Dropout,
    pub output:     Linear<B>,
}

impl<B: Backend> ScatteringHead<B> {
    pub fn forward(&self, coefficients: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.input_norm.forward(coefficients);
        for block in &self.convs {
            x = block.forward(x);
        }
        let mut x: Tensor<B, 2> = self.pool.forward(x).flatten(1, 3);
        if let Some(hidden) = &self.hidden {
            x = leaky_relu(hidden.forward(self.dropout.forward(x)), LEAKY_SLOPE);
        }
        self.output.forward(self.dropout.forward(x))
    }
}

/// Scattering front-end + head.
#[derive(Module, Debug)]
pub struct ScatteringRegressor<B: Backend> {
    pub frontend: LearnableScattering<B>,
    pub head:     ScatteringHead<B>,
}

/// Attach a head of the given kind to a scattering front-end.
pub fn attach_head<B: Backend>(
    frontend: LearnableScattering<B>,
    config:   &ScatteringConfig,
    kind:     HeadKind,
    features: usize,
    hidden:   usize,
    dropout:  f64,
    device:   &B::Device,
) -> ScatteringRegressor<B> {
    let in_channels = config.output_channels();

    let (convs, pooled_channels) = match kind {
        HeadKind::Cnn => conv_stack(in_channels, hidden, config.output_size(), device),
        HeadKind::Mlp | HeadKind::Linear => (Vec::new(), in_channels),
    };

    let (hidden_layer, out_in) = match kind {
        HeadKind::Linear => (None, pooled_channels),
        HeadKind::Mlp | HeadKind::Cnn => (
            Some(LinearConfig::new(pooled_channels, hidden).init(device)),
            hidden,
        ),
    };

    let head = ScatteringHead {
        input_norm: BatchNormConfig::new(in_channels).init(device),
        convs,
        pool:    AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        hidden:  hidden_layer,
        dropout: DropoutConfig::new(dropout).init(),
        output:  LinearConfig::new(out_in, features).init(device),
    };

    ScatteringRegressor { frontend, head }
}

impl<B: Backend> MapRegressor<B> for ScatteringRegressor<B> {
    fn forward(&self, maps: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.frontend.forward(maps))
    }

    fn diagnostics(&self) -> Option<&dyn DiagnosticParameterSource> {
        Some(&self.frontend)
    }
}

impl<B: AutodiffBackend> LearnableFilters<B> for ScatteringRegressor<B> {
    fn take_filter_grads(&self, grads: &mut B::Gradients) -> Vec<(FilterParam, GradientsParams)> {
        FilterParam::ALL
            .iter()
            .map(|&kind| (kind, GradientsParams::from_module(grads, self.frontend.param(kind))))
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = NdArray;

    fn small_config() -> ScatteringConfig {
        ScatteringConfig::new(1, 16).with_scales(2).with_orientations(2)
    }

    #[test]
    fn test_channel_bookkeeping() {
        let cfg = small_config();
        // F = 4, pairs: j1 = 0 (2 filters) × j2 = 1 (2 filters) = 4
        assert_eq!(cfg.num_filters(), 4);
        assert_eq!(cfg.second_order_pairs().len(), 4);
        assert_eq!(cfg.coefficients_per_channel(), 1 + 4 + 4);
        assert_eq!(cfg.output_size(), 4);
        assert_eq!(cfg.kernel_size() % 2, 1);

        let first_only = small_config().with_order(1);
        assert_eq!(first_only.coefficients_per_channel(), 5);
    }

    #[test]
    fn test_filters_are_zero_mean() {
        let device = Default::default();
        let frontend: LearnableScattering<B> = small_config().init(&device);
        let (re, im) = frontend.filter_bank();
        let f = re.dims()[0];

        let re_sums = to_host(re.sum_dim(1).sum_dim(2).reshape([f])).unwrap();
        let im_sums = to_host(im.sum_dim(1).sum_dim(2).reshape([f])).unwrap();
        for s in re_sums.iter().chain(&im_sums) {
            assert!(s.abs() < 1e-4, "filter sum {s}");
        }
    }

    #[test]
    fn test_frontend_output_shape() {
        let device = Default::default();
        let cfg = ScatteringConfig::new(2, 16).with_scales(2).with_orientations(2);
        let frontend: LearnableScattering<B> = cfg.init(&device);

        let x = Tensor::<B, 4>::random([3, 2, 16, 16], burn::tensor::Distribution::Default, &device);
        let s = frontend.forward(x);
        assert_eq!(s.dims(), [3, cfg.output_channels(), 4, 4]);
    }

    #[test]
    fn test_every_head_kind_produces_features() {
        let device = Default::default();
        let cfg = small_config();
        for kind in [HeadKind::Cnn, HeadKind::Mlp, HeadKind::Linear] {
            let model: ScatteringRegressor<B> =
                attach_head(cfg.init(&device), &cfg, kind, 4, 8, 0.1, &device);
            let x = Tensor::<B, 4>::ones([2, 1, 16, 16], &device);
            assert_eq!(model.forward(x).dims(), [2, 4], "head {kind}");
        }
    }

    #[test]
    fn test_diagnostics_expose_all_filter_parameters() {
        let device = Default::default();
        let cfg   = small_config();
        let model: ScatteringRegressor<B> =
            attach_head(cfg.init(&device), &cfg, HeadKind::Linear, 2, 8, 0.0, &device);

        let diag = model.diagnostics().expect("scattering exposes filters").diagnostic_parameters().unwrap();
        let names: Vec<&str> = diag.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["orientation", "frequency", "scale", "slant"]);
        assert!(diag.iter().all(|d| d.values.len() == 4));
        // initial scale doubles with j
        assert!((diag[2].values[2] / diag[2].values[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_filter_grads_are_split_out() {
        type AB = Autodiff<NdArray>;
        let device = Default::default();
        let cfg   = small_config();
        let model: ScatteringRegressor<AB> =
            attach_head(cfg.init(&device), &cfg, HeadKind::Linear, 2, 8, 0.0, &device);

        let x = Tensor::<AB, 4>::random([2, 1, 16, 16], burn::tensor::Distribution::Default, &device);
        let loss = model.forward(x).powf_scalar(2.0).mean();
        let mut grads = loss.backward();

        let split = model.take_filter_grads(&mut grads);
        assert_eq!(split.len(), 4);
        for (kind, g) in &split {
            assert_eq!(g.len(), 1, "{} should carry one gradient", kind.name());
        }

        // What remains belongs to the head only
        let rest = GradientsParams::from_grads(grads, &model);
        assert!(rest.len() > 0);
        for kind in FilterParam::ALL {
            let id = model.frontend.param(kind).id;
            assert!(rest.get::<NdArray, 1>(id).is_none());
        }
    }
}
