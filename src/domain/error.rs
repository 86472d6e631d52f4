// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure is fatal for the run. The enums below only give
// the failures a name so callers and tests can tell them apart;
// the application layer wraps them in anyhow with context.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or inconsistent training options.
///
/// Raised at parse time (CLI / config file) or by
/// `TrainConfig::validate`, always before the first batch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid loss '{0}', expected one of: l1, l2, huber")]
    UnknownEnhancementLoss(String),

    #[error(
        "invalid acoustic loss type '{0}', expected one of: \
         l2, l1, frame_energy_weighted_l2, frame_energy_weighted_l1"
    )]
    UnknownAcousticLoss(String),

    #[error("invalid mode '{0}', must be either 'train' or 'eval'")]
    InvalidMode(String),

    #[error("unknown optimizer '{0}', expected adam or sgd")]
    UnknownOptimizer(String),

    #[error("unknown device '{0}', expected cpu or gpu")]
    UnknownDevice(String),

    #[error("acoustic loss must be enabled when acoustic-loss-only is set")]
    AcousticOnlyWithoutAcousticLoss,

    #[error("acoustic loss is enabled but no acoustic model path was given")]
    MissingAcousticModel,

    #[error("cannot load acoustic estimator from '{path}': {reason}")]
    EstimatorLoad { path: PathBuf, reason: String },

    #[error(
        "acoustic estimator checkpoint '{path}' holds parameters shaped {found:?}, \
         the estimator expects {expected:?}"
    )]
    EstimatorLayout {
        path:     PathBuf,
        expected: Vec<Vec<usize>>,
        found:    Vec<Vec<usize>>,
    },

    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidWeight { field: &'static str, value: f64 },
}

/// Problems reading or writing a checkpoint package.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("cannot access checkpoint '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not a checkpoint package")]
    BadMagic(PathBuf),

    #[error("checkpoint '{path}' is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("checkpoint '{path}' has no '{section}' section")]
    MissingSection { path: PathBuf, section: String },

    #[error("cannot encode or decode the '{section}' record: {reason}")]
    Record { section: String, reason: String },

    #[error("checkpoint '{path}' holds a '{stored}' model, the run trains a '{current}'")]
    ArchitectureMismatch {
        path:    PathBuf,
        stored:  String,
        current: String,
    },
}

/// Failures raised while a pass is running.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("non-finite loss {value} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss { epoch: usize, batch: usize, value: f64 },

    #[error("{phase} pass of epoch {epoch} produced no batches")]
    EmptyPass { phase: &'static str, epoch: usize },

    #[error("a {samples}-sample signal is too short for an STFT with n_fft={n_fft}")]
    SignalTooShort { n_fft: usize, samples: usize },
}
