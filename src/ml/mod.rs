// ============================================================
// Layer 5 — Machine Learning Layer
// ============================================================
// Burn code: the spectral transform, the three losses, the
// baseline networks, and the solver that trains a model with
// them.
//
//   contracts.rs     — traits an enhancement model / acoustic
//                      estimator must implement
//   stft.rs          — differentiable STFT and frame energy
//   acoustic_loss.rs — distance in acoustic-parameter space
//   stft_loss.rs     — multi-resolution STFT loss
//   losses.rs        — waveform losses and the composite objective
//   baseline.rs      — small reference models
//   optim.rs         — Adam / SGD configuration
//   solver.rs        — epoch loop, resume, checkpointing

pub mod contracts;
pub mod stft;
pub mod acoustic_loss;
pub mod stft_loss;
pub mod losses;
pub mod baseline;
pub mod optim;
pub mod solver;
