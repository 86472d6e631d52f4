// ============================================================
// Layer 5 — Model Contracts
// ============================================================
// The two networks the trainer works with are injected: any
// Burn module implementing these traits can be trained or used
// as the frozen acoustic estimator.
//
//   EnhancementModel   noisy [batch, samples] → estimate [batch, samples]
//   AcousticEstimator  spectrum [batch, frames, 2 * bins]
//                        → embedding [batch, frames, P]

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::kinds::Mode;

/// Identifies an architecture and its hyper-parameters. Stored in
/// checkpoints so weights are never loaded into a different model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name:   String,
    pub config: serde_json::Value,
}

pub trait EnhancementModel<B: Backend>: Module<B> {
    fn forward(&self, noisy: Tensor<B, 2>) -> Tensor<B, 2>;

    fn descriptor(&self) -> ModelDescriptor;
}

pub trait AcousticEstimator<B: Backend>: Module<B> {
    /// `mode` decides train-only behaviour such as dropout.
    fn forward(&self, spectrum: Tensor<B, 3>, mode: Mode) -> Tensor<B, 3>;
}
