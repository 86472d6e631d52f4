// ============================================================
// Layer 5 — Optimiser Configuration
// ============================================================
// Adam (the default) or plain SGD, both through Burn's optimiser
// configs so their state is a Burn record that checkpoints can
// carry.
//
// Gradient clipping works on the global L2 norm over every
// parameter gradient of the model:
//
//   total = sqrt(Σ_p ‖g_p‖²)
//   g_p  ← g_p · max_norm / (total + 1e-6)     when total > max_norm
//
// The solver applies it between backward and the optimizer step.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{momentum::MomentumConfig, AdamConfig, GradientsParams, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

/// Adam with the given betas, epsilon 1e-8.
pub fn adam(beta_1: f64, beta_2: f64) -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(beta_1 as f32)
        .with_beta_2(beta_2 as f32)
        .with_epsilon(1e-8)
}

/// SGD, with heavy-ball momentum when `momentum > 0`.
pub fn sgd(momentum: f64) -> SgdConfig {
    let momentum = (momentum > 0.0).then(|| MomentumConfig::new().with_momentum(momentum));
    SgdConfig::new().with_momentum(momentum)
}

// ─── Global-norm clipping ─────────────────────────────────────────────────────
struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    sum:   f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a> {
    grads:  &'a mut GradientsParams,
    factor: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm over all of `model`'s parameter gradients.
pub fn grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(model: &M, grads: &GradientsParams) -> f64 {
    let mut norm = SquaredNorm { grads, sum: 0.0 };
    model.visit(&mut norm);
    norm.sum.sqrt()
}

/// Rescale every gradient so the global norm is at most `max_norm`.
/// Returns the gradients and the norm before clipping.
pub fn clip_grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(
    model:     &M,
    mut grads: GradientsParams,
    max_norm:  f64,
) -> (GradientsParams, f64) {
    let total = grad_norm::<B, M>(model, &grads);
    if total > max_norm {
        let mut rescale = Rescale { grads: &mut grads, factor: max_norm / (total + 1e-6) };
        model.visit(&mut rescale);
    }
    (grads, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{
        baseline::{ConvDenoiser, ConvDenoiserConfig},
        contracts::EnhancementModel,
    };
    use approx::assert_relative_eq;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::TensorData;

    type TB = Autodiff<NdArray>;

    fn model_and_grads() -> (ConvDenoiser<TB>, GradientsParams) {
        let device = Default::default();
        let model = ConvDenoiserConfig::new().with_channels(2).with_kernel(3).init::<TB>(&device);
        let x = Tensor::<TB, 2>::from_data(
            TensorData::new((0..64).map(|t| (t as f32 * 0.4).sin() * 3.0).collect::<Vec<_>>(), [2, 32]),
            &device,
        );
        let loss = model.forward(x).powf_scalar(2.0).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        (model, grads)
    }

    #[test]
    fn test_global_norm_is_clipped_to_max_norm() {
        let (model, grads) = model_and_grads();
        let before = grad_norm::<TB, _>(&model, &grads);
        assert!(before > 1e-3);

        let (clipped, reported) = clip_grad_norm::<TB, _>(&model, grads, 1e-3);
        assert_relative_eq!(reported, before, max_relative = 1e-9);
        // Four parameter tensors, one joint norm
        assert_relative_eq!(grad_norm::<TB, _>(&model, &clipped), 1e-3, max_relative = 1e-3);
    }

    #[test]
    fn test_small_gradients_are_left_alone() {
        let (model, grads) = model_and_grads();
        let before = grad_norm::<TB, _>(&model, &grads);
        let (kept, _) = clip_grad_norm::<TB, _>(&model, grads, before * 10.0);
        assert_relative_eq!(grad_norm::<TB, _>(&model, &kept), before, max_relative = 1e-6);
    }

    #[test]
    fn test_sgd_momentum_is_optional() {
        assert!(sgd(0.0).momentum.is_none());
        assert!(sgd(0.9).momentum.is_some());
        assert!(adam(0.9, 0.999).grad_clipping.is_none());
    }
}
