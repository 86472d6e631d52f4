// ============================================================
// Layer 2 — Training Configuration
// ============================================================
// Every option of a training run as a typed, serialisable
// value. A snapshot of it is stored in each checkpoint.
//
// Grouped by concern:
//   data        where the audio comes from and how it is cut
//   loss        which losses make up the objective
//   optim       optimiser, learning rate, clipping
//   checkpoint  resume sources, output files, periodic saves
//   augment     training-time augmentations
//
// `validate` runs before anything is built so a bad option
// fails the run before the first batch.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::augment::AugmentConfig;
use crate::domain::{
    error::ConfigError,
    kinds::{AcousticLossKind, DeviceKind, EnhancementLossKind, OptimizerKind},
};

// ─── DataConfig ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory with `noisy/` and `clean/` sub-directories
    pub train_dir:      PathBuf,
    /// Separate validation set; without it `valid_fraction` of the
    /// training clips is held out
    pub valid_dir:      Option<PathBuf>,
    /// Test set enhanced into `samples_dir` at evaluation epochs
    pub test_dir:       Option<PathBuf>,
    pub valid_fraction: f64,
    pub sample_rate:    u32,
    /// Training example length in seconds
    pub segment:        f64,
    /// Hop between training examples in seconds
    pub stride:         f64,
    pub pad:            bool,
    pub batch_size:     usize,
    pub seed:           u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_dir:      PathBuf::from("dataset/train"),
            valid_dir:      None,
            test_dir:       None,
            valid_fraction: 0.0,
            sample_rate:    16_000,
            segment:        4.0,
            stride:         1.0,
            pad:            true,
            batch_size:     64,
            seed:           2036,
        }
    }
}

impl DataConfig {
    pub fn segment_samples(&self) -> usize {
        (self.segment * self.sample_rate as f64) as usize
    }

    pub fn stride_samples(&self) -> usize {
        ((self.stride * self.sample_rate as f64) as usize).max(1)
    }
}

// ─── LossConfig ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    pub loss:                EnhancementLossKind,
    pub stft_loss:           bool,
    pub stft_loss_weight:    f64,
    pub stft_sc_factor:      f64,
    pub stft_mag_factor:     f64,
    pub acoustic_loss:       bool,
    pub ac_loss_weight:      f64,
    pub ac_loss_type:        AcousticLossKind,
    /// Estimator weights (CompactRecorder file, no extension)
    pub acoustic_model_path: Option<PathBuf>,
    pub acoustic_loss_only:  bool,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            loss:                EnhancementLossKind::L1,
            stft_loss:           false,
            stft_loss_weight:    1.0,
            stft_sc_factor:      0.5,
            stft_mag_factor:     0.5,
            acoustic_loss:       false,
            ac_loss_weight:      1.0,
            ac_loss_type:        AcousticLossKind::L2,
            acoustic_model_path: None,
            acoustic_loss_only:  false,
        }
    }
}

// ─── OptimConfig ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimConfig {
    pub optim:         OptimizerKind,
    pub lr:            f64,
    pub beta1:         f64,
    pub beta2:         f64,
    /// SGD only
    pub momentum:      f64,
    pub gradient_clip: bool,
    pub grad_max_norm: f64,
}

impl Default for OptimConfig {
    fn default() -> Self {
        Self {
            optim:         OptimizerKind::Adam,
            lr:            3e-4,
            beta1:         0.9,
            beta2:         0.999,
            momentum:      0.0,
            gradient_clip: false,
            grad_max_norm: 5.0,
        }
    }
}

impl OptimConfig {
    /// Clipping threshold, when clipping is on
    pub fn max_norm(&self) -> Option<f64> {
        self.gradient_clip.then_some(self.grad_max_norm)
    }
}

// ─── CheckpointConfig ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Write and resume from `checkpoint_file`
    pub checkpoint:           bool,
    pub checkpoint_file:      PathBuf,
    pub best_file:            PathBuf,
    pub history_file:         PathBuf,
    /// Ignore an existing checkpoint and start over
    pub restart:              bool,
    /// Start from the weights of another run's checkpoint
    pub continue_from:        Option<PathBuf>,
    /// With `continue_from`, take its best weights instead of the latest
    pub continue_best:        bool,
    /// Overwrite the weights with a named pretrained model
    pub continue_pretrained:  Option<String>,
    pub pretrained_dir:       PathBuf,
    /// Keep a numbered copy of every epoch's checkpoint
    pub save_checkpoints:     bool,
    pub checkpoints_dir:      PathBuf,
    /// Also save the numbered copy every N training batches
    pub mid_epoch_save_every: usize,
    /// Only rewrite the checkpoint of the resumed state, then exit
    pub save_again:           bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint:           true,
            checkpoint_file:      PathBuf::from("checkpoint.th"),
            best_file:            PathBuf::from("best.th"),
            history_file:         PathBuf::from("history.json"),
            restart:              false,
            continue_from:        None,
            continue_best:        false,
            continue_pretrained:  None,
            pretrained_dir:       PathBuf::from("pretrained"),
            save_checkpoints:     false,
            checkpoints_dir:      PathBuf::from("checkpoints"),
            mid_epoch_save_every: 1000,
            save_again:           false,
        }
    }
}

// ─── TrainConfig ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data:           DataConfig,
    pub loss:           LossConfig,
    pub optim:          OptimConfig,
    pub checkpoint:     CheckpointConfig,
    pub augment:        AugmentConfig,
    pub epochs:         usize,
    /// Evaluate and enhance samples every N epochs (and after the last)
    pub eval_every:     usize,
    /// Progress lines per pass
    pub num_prints:     usize,
    pub device:         DeviceKind,
    /// Accepted for compatibility; training always runs in full precision
    pub use_amp:        bool,
    /// Abort on a NaN or infinite training loss
    pub detect_anomaly: bool,
    pub samples_dir:    PathBuf,
    pub metrics_file:   PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data:           DataConfig::default(),
            loss:           LossConfig::default(),
            optim:          OptimConfig::default(),
            checkpoint:     CheckpointConfig::default(),
            augment:        AugmentConfig::default(),
            epochs:         400,
            eval_every:     10,
            num_prints:     5,
            device:         DeviceKind::Cpu,
            use_amp:        false,
            detect_anomaly: true,
            samples_dir:    PathBuf::from("samples"),
            metrics_file:   PathBuf::from("metrics.csv"),
        }
    }
}

fn positive(value: f64, field: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field })
    }
}

fn weight(value: f64, field: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight { field, value })
    }
}

impl TrainConfig {
    /// Reject inconsistent options. Runs before any data is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let loss = &self.loss;
        if loss.acoustic_loss_only && !loss.acoustic_loss {
            return Err(ConfigError::AcousticOnlyWithoutAcousticLoss);
        }
        if loss.acoustic_loss && loss.acoustic_model_path.is_none() {
            return Err(ConfigError::MissingAcousticModel);
        }
        weight(loss.stft_loss_weight, "stft_loss_weight")?;
        weight(loss.stft_sc_factor, "stft_sc_factor")?;
        weight(loss.stft_mag_factor, "stft_mag_factor")?;
        weight(loss.ac_loss_weight, "ac_loss_weight")?;

        if self.eval_every == 0 {
            return Err(ConfigError::NonPositive { field: "eval_every" });
        }
        if self.data.batch_size == 0 {
            return Err(ConfigError::NonPositive { field: "batch_size" });
        }
        if self.data.sample_rate == 0 {
            return Err(ConfigError::NonPositive { field: "sample_rate" });
        }
        positive(self.data.segment, "segment")?;
        positive(self.data.stride, "stride")?;
        positive(self.optim.lr, "lr")?;
        if self.optim.gradient_clip {
            positive(self.optim.grad_max_norm, "grad_max_norm")?;
        }
        if self.checkpoint.mid_epoch_save_every == 0 {
            return Err(ConfigError::NonPositive { field: "mid_epoch_save_every" });
        }
        Ok(())
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }
}
