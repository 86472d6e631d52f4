// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands: `train` and `history`.
//
// `train` accepts every TrainConfig option as a flag. All flags
// are optional: a run starts from the defaults (or from the JSON
// file given with --config) and only the flags actually passed
// override it. Boolean options take an optional value, so both
// `--stft-loss` and `--stft-loss false` work.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::config::TrainConfig;
use crate::domain::kinds::{AcousticLossKind, DeviceKind, EnhancementLossKind, OptimizerKind};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a speech enhancement model
    Train(TrainArgs),

    /// Print the per-epoch summary of a history file
    History(HistoryArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with a full or partial TrainConfig
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub options: TrainOptions,
}

impl TrainArgs {
    /// Config file (or defaults) with the command-line flags applied.
    pub fn into_config(self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };
        self.options.apply_to(&mut config);
        Ok(config)
    }
}

/// Command-line overrides of TrainConfig fields.
#[derive(Args, Debug, Default)]
pub struct TrainOptions {
    // ── Data ──────────────────────────────────────────────────────────────────
    /// Directory with `noisy/` and `clean/` WAV sub-directories
    #[arg(long)]
    pub train_dir: Option<PathBuf>,

    /// Separate validation directory, same layout as --train-dir
    #[arg(long)]
    pub valid_dir: Option<PathBuf>,

    /// Test directory, same layout; its noisy clips are enhanced into
    /// --samples-dir every --eval-every epochs
    #[arg(long)]
    pub test_dir: Option<PathBuf>,

    /// Share of training clips held out when no --valid-dir is given
    #[arg(long)]
    pub valid_fraction: Option<f64>,

    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Example length in seconds
    #[arg(long)]
    pub segment: Option<f64>,

    /// Hop between examples in seconds
    #[arg(long)]
    pub stride: Option<f64>,

    /// Zero-pad the last example of each clip
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub pad: Option<bool>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    // ── Loss ──────────────────────────────────────────────────────────────────
    /// Base waveform loss: l1, l2 or huber
    #[arg(long)]
    pub loss: Option<EnhancementLossKind>,

    /// Add the multi-resolution STFT loss
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub stft_loss: Option<bool>,

    #[arg(long)]
    pub stft_loss_weight: Option<f64>,

    #[arg(long)]
    pub stft_sc_factor: Option<f64>,

    #[arg(long)]
    pub stft_mag_factor: Option<f64>,

    /// Add the acoustic parameter loss
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub acoustic_loss: Option<bool>,

    #[arg(long)]
    pub ac_loss_weight: Option<f64>,

    /// l2, l1, frame_energy_weighted_l2 or frame_energy_weighted_l1
    #[arg(long)]
    pub ac_loss_type: Option<AcousticLossKind>,

    /// Acoustic estimator weights (file path without extension)
    #[arg(long)]
    pub acoustic_model_path: Option<PathBuf>,

    /// Train on the acoustic loss alone
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub acoustic_loss_only: Option<bool>,

    // ── Optimiser ─────────────────────────────────────────────────────────────
    /// adam or sgd
    #[arg(long)]
    pub optim: Option<OptimizerKind>,

    #[arg(long)]
    pub lr: Option<f64>,

    #[arg(long)]
    pub beta1: Option<f64>,

    #[arg(long)]
    pub beta2: Option<f64>,

    #[arg(long)]
    pub momentum: Option<f64>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub gradient_clip: Option<bool>,

    #[arg(long)]
    pub grad_max_norm: Option<f64>,

    // ── Checkpoints ───────────────────────────────────────────────────────────
    /// Write (and resume from) the checkpoint file
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub checkpoint: Option<bool>,

    #[arg(long)]
    pub checkpoint_file: Option<PathBuf>,

    #[arg(long)]
    pub best_file: Option<PathBuf>,

    #[arg(long)]
    pub history_file: Option<PathBuf>,

    /// Ignore an existing checkpoint
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub restart: Option<bool>,

    /// Initialise from another run's checkpoint
    #[arg(long)]
    pub continue_from: Option<PathBuf>,

    /// With --continue-from, use its best weights
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub continue_best: Option<bool>,

    /// Fine-tune from a named pretrained model
    #[arg(long)]
    pub continue_pretrained: Option<String>,

    #[arg(long)]
    pub pretrained_dir: Option<PathBuf>,

    /// Keep a numbered checkpoint per epoch
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub save_checkpoints: Option<bool>,

    #[arg(long)]
    pub checkpoints_dir: Option<PathBuf>,

    #[arg(long)]
    pub mid_epoch_save_every: Option<usize>,

    /// Rewrite the checkpoint of the resumed state and exit
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub save_again: Option<bool>,

    // ── Augmentation ──────────────────────────────────────────────────────────
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub remix: Option<bool>,

    /// Maximum masked band width, 0 disables band masking
    #[arg(long)]
    pub bandmask: Option<f64>,

    #[arg(long)]
    pub bands: Option<usize>,

    /// Maximum random shift in samples, 0 disables shifting
    #[arg(long)]
    pub shift: Option<usize>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub shift_same: Option<bool>,

    /// Reverb probability, 0 disables reverb
    #[arg(long)]
    pub revecho: Option<f64>,

    #[arg(long)]
    pub revecho_initial: Option<f64>,

    #[arg(long)]
    pub rt60_min: Option<f64>,

    #[arg(long)]
    pub rt60_max: Option<f64>,

    #[arg(long)]
    pub first_delay_min: Option<f64>,

    #[arg(long)]
    pub first_delay_max: Option<f64>,

    #[arg(long)]
    pub repeat: Option<usize>,

    #[arg(long)]
    pub jitter: Option<f64>,

    #[arg(long)]
    pub keep_clean: Option<f64>,

    // ── Run ───────────────────────────────────────────────────────────────────
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Evaluate on the test set every N epochs
    #[arg(long)]
    pub eval_every: Option<usize>,

    /// Progress lines per pass
    #[arg(long)]
    pub num_prints: Option<usize>,

    /// cpu or gpu
    #[arg(long)]
    pub device: Option<DeviceKind>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub use_amp: Option<bool>,

    /// Abort on a NaN or infinite training loss
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub detect_anomaly: Option<bool>,

    #[arg(long)]
    pub samples_dir: Option<PathBuf>,

    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

/// Overwrite `$target` when the flag was given.
macro_rules! set {
    ($target:expr, $flag:expr) => {
        if let Some(value) = $flag {
            $target = value;
        }
    };
}

impl TrainOptions {
    pub fn apply_to(self, c: &mut TrainConfig) {
        set!(c.data.train_dir, self.train_dir);
        if self.valid_dir.is_some() {
            c.data.valid_dir = self.valid_dir;
        }
        if self.test_dir.is_some() {
            c.data.test_dir = self.test_dir;
        }
        set!(c.data.valid_fraction, self.valid_fraction);
        set!(c.data.sample_rate, self.sample_rate);
        set!(c.data.segment, self.segment);
        set!(c.data.stride, self.stride);
        set!(c.data.pad, self.pad);
        set!(c.data.batch_size, self.batch_size);
        set!(c.data.seed, self.seed);

        set!(c.loss.loss, self.loss);
        set!(c.loss.stft_loss, self.stft_loss);
        set!(c.loss.stft_loss_weight, self.stft_loss_weight);
        set!(c.loss.stft_sc_factor, self.stft_sc_factor);
        set!(c.loss.stft_mag_factor, self.stft_mag_factor);
        set!(c.loss.acoustic_loss, self.acoustic_loss);
        set!(c.loss.ac_loss_weight, self.ac_loss_weight);
        set!(c.loss.ac_loss_type, self.ac_loss_type);
        if self.acoustic_model_path.is_some() {
            c.loss.acoustic_model_path = self.acoustic_model_path;
        }
        set!(c.loss.acoustic_loss_only, self.acoustic_loss_only);

        set!(c.optim.optim, self.optim);
        set!(c.optim.lr, self.lr);
        set!(c.optim.beta1, self.beta1);
        set!(c.optim.beta2, self.beta2);
        set!(c.optim.momentum, self.momentum);
        set!(c.optim.gradient_clip, self.gradient_clip);
        set!(c.optim.grad_max_norm, self.grad_max_norm);

        set!(c.checkpoint.checkpoint, self.checkpoint);
        set!(c.checkpoint.checkpoint_file, self.checkpoint_file);
        set!(c.checkpoint.best_file, self.best_file);
        set!(c.checkpoint.history_file, self.history_file);
        set!(c.checkpoint.restart, self.restart);
        if self.continue_from.is_some() {
            c.checkpoint.continue_from = self.continue_from;
        }
        set!(c.checkpoint.continue_best, self.continue_best);
        if self.continue_pretrained.is_some() {
            c.checkpoint.continue_pretrained = self.continue_pretrained;
        }
        set!(c.checkpoint.pretrained_dir, self.pretrained_dir);
        set!(c.checkpoint.save_checkpoints, self.save_checkpoints);
        set!(c.checkpoint.checkpoints_dir, self.checkpoints_dir);
        set!(c.checkpoint.mid_epoch_save_every, self.mid_epoch_save_every);
        set!(c.checkpoint.save_again, self.save_again);

        set!(c.augment.remix, self.remix);
        set!(c.augment.bandmask, self.bandmask);
        set!(c.augment.bands, self.bands);
        set!(c.augment.shift, self.shift);
        set!(c.augment.shift_same, self.shift_same);
        set!(c.augment.revecho, self.revecho);
        set!(c.augment.revecho_initial, self.revecho_initial);
        set!(c.augment.rt60.0, self.rt60_min);
        set!(c.augment.rt60.1, self.rt60_max);
        set!(c.augment.first_delay.0, self.first_delay_min);
        set!(c.augment.first_delay.1, self.first_delay_max);
        set!(c.augment.repeat, self.repeat);
        set!(c.augment.jitter, self.jitter);
        set!(c.augment.keep_clean, self.keep_clean);

        set!(c.epochs, self.epochs);
        set!(c.eval_every, self.eval_every);
        set!(c.num_prints, self.num_prints);
        set!(c.device, self.device);
        set!(c.use_amp, self.use_amp);
        set!(c.detect_anomaly, self.detect_anomaly);
        set!(c.samples_dir, self.samples_dir);
        set!(c.metrics_file, self.metrics_file);
    }
}

/// Defaults with the given flags applied.
impl From<TrainOptions> for TrainConfig {
    fn from(options: TrainOptions) -> Self {
        let mut config = TrainConfig::default();
        options.apply_to(&mut config);
        config
    }
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// History file written by `train`
    #[arg(long, default_value = "history.json")]
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_args(flags: &[&str]) -> TrainArgs {
        let argv = ["tap-denoiser", "train"].iter().chain(flags);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Train(args) => args,
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        let config = train_args(&[]).into_config().unwrap();
        assert_eq!(config, TrainConfig::default());
    }

    #[test]
    fn test_flags_override_fields() {
        let config = train_args(&[
            "--loss", "huber",
            "--stft-loss",
            "--acoustic-loss",
            "--ac-loss-type", "frame_energy_weighted_l2",
            "--acoustic-model-path", "tap/estimator",
            "--checkpoint", "false",
            "--rt60-max", "2.0",
            "--epochs", "7",
            "--device", "cuda",
            "--test-dir", "dataset/test",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.loss.loss, EnhancementLossKind::Huber);
        assert!(config.loss.stft_loss);
        assert!(config.loss.acoustic_loss);
        assert_eq!(config.loss.ac_loss_type, AcousticLossKind::FrameEnergyWeightedL2);
        assert_eq!(config.loss.acoustic_model_path, Some(PathBuf::from("tap/estimator")));
        assert!(!config.checkpoint.checkpoint);
        assert_eq!(config.augment.rt60, (0.3, 2.0));
        assert_eq!(config.epochs, 7);
        assert_eq!(config.device, DeviceKind::Gpu);
        assert_eq!(config.data.test_dir, Some(PathBuf::from("dataset/test")));
    }

    #[test]
    fn test_unknown_loss_is_rejected_at_parse_time() {
        let result = Cli::try_parse_from(["tap-denoiser", "train", "--loss", "l3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "epochs": 12, "eval_every": 3 }"#).unwrap();

        let config = train_args(&["--config", path.to_str().unwrap(), "--epochs", "20"])
            .into_config()
            .unwrap();
        assert_eq!(config.epochs, 20);
        assert_eq!(config.eval_every, 3);
    }
}
