// ============================================================
// Layer 5 — Acoustic Loss
// ============================================================
// Compares clean and enhanced speech in the space of temporal
// acoustic parameters predicted by a frozen estimator network.
//
//   clean    → STFT            → estimator → clean embedding
//   enhanced → STFT + energy   → estimator → enhanced embedding
//
//   l2                        mean((enh - clean)²)
//   l1                        mean(|enh - clean|)
//   frame_energy_weighted_l2  mean((sqrt(σ(E)) · (enh - clean))²)
//   frame_energy_weighted_l1  mean(σ(E) · |enh - clean|)
//
// E is the short-time energy of the enhanced frames and the
// per-frame weight is broadcast over the embedding axis, so
// quiet frames count for less.
//
// The estimator is frozen: gradients flow through it to the
// enhanced waveform but its own parameters never change.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::{activation::sigmoid, backend::AutodiffBackend},
};
use std::path::Path;

use crate::domain::{
    error::{ConfigError, TrainError},
    kinds::{AcousticLossKind, Mode},
};
use crate::ml::{
    contracts::AcousticEstimator,
    stft::{Stft, StftConfig},
};

#[derive(Debug, Clone)]
pub struct AcousticLoss<B: Backend, E> {
    kind:      AcousticLossKind,
    stft:      Stft<B>,
    estimator: E,
}

impl<B: Backend, E: AcousticEstimator<B>> AcousticLoss<B, E> {
    /// Wrap an already loaded estimator. Its parameters are frozen.
    pub fn new(kind: AcousticLossKind, estimator: E, device: &B::Device) -> Self {
        Self {
            kind,
            stft: Stft::new(StftConfig::acoustic(), device),
            estimator: estimator.no_grad(),
        }
    }

    /// Load the estimator weights from a CompactRecorder file
    /// (`path` without extension) into `template`.
    pub fn from_checkpoint(
        kind:     AcousticLossKind,
        template: E,
        path:     &Path,
        device:   &B::Device,
    ) -> Result<Self, ConfigError> {
        let estimator = load_estimator(template, path, device)?;
        tracing::info!(
            "Acoustic estimator loaded from '{}' ({} parameters, {} loss)",
            path.display(),
            estimator.num_params(),
            kind
        );
        Ok(Self::new(kind, estimator, device))
    }

    pub fn kind(&self) -> AcousticLossKind {
        self.kind
    }

    /// Scalar distance between the embeddings of `clean` and
    /// `enhanced`, both `[batch, samples]`.
    pub fn compute(
        &self,
        clean:    Tensor<B, 2>,
        enhanced: Tensor<B, 2>,
        mode:     Mode,
    ) -> Result<Tensor<B, 1>, TrainError> {
        let clean_emb = self.estimator.forward(self.stft.forward(clean)?, mode);
        let (enh_spec, energy) = self.stft.forward_with_energy(enhanced)?;
        let enh_emb = self.estimator.forward(enh_spec, mode);

        Ok(distance(self.kind, enh_emb - clean_emb, energy))
    }

    /// Signals must be strictly longer than this.
    pub fn min_samples(&self) -> usize {
        self.stft.config().min_samples()
    }
}

/// Reduce an embedding difference `[batch, frames, P]` to a scalar.
/// `energy` is the enhanced frames' energy `[batch, frames]`; only
/// the weighted kinds use it.
fn distance<B: Backend>(kind: AcousticLossKind, diff: Tensor<B, 3>, energy: Tensor<B, 2>) -> Tensor<B, 1> {
    match kind {
        AcousticLossKind::L2 => diff.powf_scalar(2.0).mean(),
        AcousticLossKind::L1 => diff.abs().mean(),
        AcousticLossKind::FrameEnergyWeightedL2 => {
            let weight = sigmoid(energy).sqrt().unsqueeze_dim::<3>(2);
            (diff * weight).powf_scalar(2.0).mean()
        }
        AcousticLossKind::FrameEnergyWeightedL1 => {
            let weight = sigmoid(energy).unsqueeze_dim::<3>(2);
            (diff.abs() * weight).mean()
        }
    }
}

impl<B, E> AcousticLoss<B, E>
where
    B: AutodiffBackend,
    E: AcousticEstimator<B> + AutodiffModule<B>,
    E::InnerModule: AcousticEstimator<B::InnerBackend>,
{
    /// The same loss on the inner backend, for validation.
    pub fn valid(&self) -> AcousticLoss<B::InnerBackend, E::InnerModule> {
        AcousticLoss {
            kind:      self.kind,
            stft:      self.stft.valid(),
            estimator: self.estimator.valid(),
        }
    }
}

/// Shapes of a module's float parameters, in visiting order.
struct ParamShapes(Vec<Vec<usize>>);

impl<B: Backend> ModuleVisitor<B> for ParamShapes {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.0.push(tensor.dims().to_vec());
    }
}

fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut shapes = ParamShapes(Vec::new());
    module.visit(&mut shapes);
    shapes.0
}

/// Load estimator weights into `template`, rejecting files whose
/// parameter shapes differ from the template's.
pub fn load_estimator<B: Backend, E: Module<B>>(
    template: E,
    path:     &Path,
    device:   &B::Device,
) -> Result<E, ConfigError> {
    let expected = param_shapes::<B, _>(&template);
    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .map_err(|e| ConfigError::EstimatorLoad {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let loaded = template.load_record(record);
    let found = param_shapes::<B, _>(&loaded);
    if found != expected {
        return Err(ConfigError::EstimatorLayout { path: path.to_path_buf(), expected, found });
    }
    Ok(loaded)
}
