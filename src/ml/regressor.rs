// ============================================================
// Layer 5 - Regressor Traits
// ============================================================
// The trainer and evaluator are generic over these traits, so
// they never know which architecture they are driving.
//
//   MapRegressor      forward pass [N, C, H, W] → [N, features]
//                     + optional diagnostic read-out
//   LearnableFilters  lets a model hand back gradients of
//                     parameters that get their own optimiser
//                     (the scattering filters)

use burn::{
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::traits::DiagnosticParameterSource;
use crate::ml::scattering::FilterParam;

pub trait MapRegressor<B: Backend>: Module<B> {
    fn forward(&self, maps: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Models with internals worth logging return themselves here.
    fn diagnostics(&self) -> Option<&dyn DiagnosticParameterSource> {
        None
    }
}

pub trait LearnableFilters<B: AutodiffBackend> {
    /// Remove the gradients of separately optimised parameters from
    /// `grads`, grouped by parameter kind. Models without such
    /// parameters return nothing and leave `grads` untouched.
    fn take_filter_grads(&self, _grads: &mut B::Gradients) -> Vec<(FilterParam, GradientsParams)> {
        Vec::new()
    }
}
