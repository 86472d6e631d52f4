// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Wires a training run together from a TrainConfig:
//
//   Step 1: Load noisy/clean WAV pairs      (Layer 4 - data)
//   Step 2: Valid and test clips            (Layer 4 - data)
//   Step 3: Cut clips into examples         (Layer 4 - data)
//   Step 4: Build model and objective       (Layer 5 - ml)
//   Step 5: Build loaders and augmentations (Layer 4 - data)
//   Step 6: Metrics, progress, samples      (Layer 6 - infra)
//   Step 7: Run the solver                  (Layer 5 - ml)
//
// The backend is picked from `device`, the optimizer from
// `optim`; everything below that is generic over both.

use anyhow::{ensure, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::dataset::Dataset,
    module::Module,
    optim::Optimizer,
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;

use crate::application::config::TrainConfig;
use crate::data::{
    augment::AugmentPipeline,
    dataset::{PairedDataset, Segmenting},
    loader::WavPairLoader,
    sampler::ShardedLoader,
    splitter::split_train_val,
};
use crate::domain::{
    history::History,
    kinds::{DeviceKind, OptimizerKind},
    traits::{BatchSource, PretrainedRegistry, WorkerGroup},
};
use crate::infra::{
    distrib::SingleProcess, metrics::CsvScalarLog, pretrained::DirectoryRegistry,
    progress::LogProgress, samples::WavSampleWriter,
};
use crate::ml::{
    acoustic_loss::AcousticLoss,
    baseline::{ConvDenoiser, ConvDenoiserConfig, FrameEstimator, FrameEstimatorConfig},
    losses::{Objective, Weighted},
    optim::{adam, sgd},
    solver::{Collaborators, Solver, TestHarness},
    stft_loss::MultiResolutionStftLoss,
};

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run training to `epochs` and return the full history.
    pub fn execute(&self) -> Result<History> {
        self.config.validate()?;
        match self.config.device {
            DeviceKind::Cpu => {
                let device = NdArrayDevice::default();
                tracing::info!("Using NdArray device: {:?}", device);
                self.run::<Autodiff<NdArray>>(device)
            }
            DeviceKind::Gpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run::<Autodiff<Wgpu>>(device)
            }
        }
    }

    fn run<B: AutodiffBackend>(&self, device: B::Device) -> Result<History> {
        let cfg = &self.config;
        let data = &cfg.data;

        // ── Step 1: Load WAV pairs ────────────────────────────────────────────
        tracing::info!("Loading clips from '{}'", data.train_dir.display());
        let clips = WavPairLoader::new(&data.train_dir, data.sample_rate).load_all()?;
        tracing::info!("Loaded {} clip pairs", clips.len());

        // ── Step 2: Validation and test clips ─────────────────────────────────
        let (train_clips, valid_clips) = match &data.valid_dir {
            Some(dir) => (clips, WavPairLoader::new(dir, data.sample_rate).load_all()?),
            None => split_train_val(clips, 1.0 - data.valid_fraction, data.seed),
        };
        tracing::info!(
            "Split: {} train, {} validation clips",
            train_clips.len(),
            valid_clips.len()
        );
        let test_clips = match &data.test_dir {
            Some(dir) => Some(WavPairLoader::new(dir, data.sample_rate).load_all()?),
            None => None,
        };

        // ── Step 3: Examples ──────────────────────────────────────────────────
        // Training clips are cut into fixed-length excerpts, validation
        // clips are used whole
        let segmenting = Segmenting {
            length: data.segment_samples(),
            stride: data.stride_samples(),
            pad:    data.pad,
        };
        let train_set = PairedDataset::new(train_clips, Some(segmenting));
        let valid_set = PairedDataset::new(valid_clips, None);
        ensure!(
            !train_set.is_empty(),
            "no training examples in '{}'",
            data.train_dir.display()
        );

        // ── Step 4: Model and objective ───────────────────────────────────────
        let model: ConvDenoiser<B> = ConvDenoiserConfig::new().init(&device);
        tracing::info!("Model ready: {} parameters", model.num_params());
        let objective = build_objective::<B>(cfg, &device)?;

        let min_samples = objective.min_samples();
        for (set, phase) in [(&train_set, "training"), (&valid_set, "validation")] {
            if let Some((len, clip)) = set.shortest_example() {
                ensure!(
                    len > min_samples,
                    "{} example from '{}' has {} samples, the spectral losses need more than {}",
                    phase,
                    clip,
                    len,
                    min_samples
                );
            }
        }

        // ── Step 5: Loaders and augmentation ──────────────────────────────────
        let workers = SingleProcess;
        let train: Box<dyn BatchSource> = Box::new(
            ShardedLoader::new(Arc::new(train_set), data.batch_size, true, data.seed).for_worker(&workers),
        );
        let valid: Option<Box<dyn BatchSource>> = (valid_set.clip_count() > 0).then(|| {
            Box::new(ShardedLoader::new(Arc::new(valid_set), 1, false, data.seed).for_worker(&workers))
                as Box<dyn BatchSource>
        });
        let augment = AugmentPipeline::from_config(&cfg.augment, data.sample_rate, data.seed);

        // ── Step 6: Infrastructure ────────────────────────────────────────────
        // Quality scores need an injected Evaluator; the CLI only writes samples
        let test: Option<TestHarness<ConvDenoiser<B::InnerBackend>>> = test_clips.map(|clips| TestHarness {
            evaluator: None,
            enhancer:  Box::new(WavSampleWriter::<B::InnerBackend>::new(clips, data.sample_rate, device.clone())),
        });
        let collab = Collaborators {
            train,
            valid,
            augment:  Box::new(augment),
            metrics:  Box::new(CsvScalarLog::new(&cfg.metrics_file)?),
            progress: Box::new(LogProgress::new(cfg.num_prints)),
            workers:  Box::new(workers) as Box<dyn WorkerGroup>,
            test,
        };
        let registry = DirectoryRegistry::<B>::new(&cfg.checkpoint.pretrained_dir, device.clone());

        // ── Step 7: Solver ────────────────────────────────────────────────────
        let optim = &cfg.optim;
        match optim.optim {
            OptimizerKind::Adam => {
                let optimizer = adam(optim.beta1, optim.beta2).init::<B, ConvDenoiser<B>>();
                solve(cfg, model, objective, optimizer, collab, &registry, device)
            }
            OptimizerKind::Sgd => {
                let optimizer = sgd(optim.momentum).init::<B, ConvDenoiser<B>>();
                solve(cfg, model, objective, optimizer, collab, &registry, device)
            }
        }
    }
}

/// Base loss plus the optional spectral and acoustic terms.
fn build_objective<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    device: &B::Device,
) -> Result<Objective<B, FrameEstimator<B>>> {
    let loss = &cfg.loss;

    let spectral = loss.stft_loss.then(|| {
        Weighted::new(
            MultiResolutionStftLoss::new(loss.stft_sc_factor, loss.stft_mag_factor, device),
            loss.stft_loss_weight,
        )
    });

    let acoustic = match (&loss.acoustic_model_path, loss.acoustic_loss) {
        (Some(path), true) => {
            let template = FrameEstimatorConfig::new().init(device);
            let acoustic = AcousticLoss::from_checkpoint(loss.ac_loss_type, template, path, device)?;
            Some(Weighted::new(acoustic, loss.ac_loss_weight))
        }
        _ => None,
    };

    Ok(Objective::new(loss.loss, spectral, acoustic, loss.acoustic_loss_only)?)
}

fn solve<B, O>(
    cfg:       &TrainConfig,
    model:     ConvDenoiser<B>,
    objective: Objective<B, FrameEstimator<B>>,
    optimizer: O,
    collab:    Collaborators<ConvDenoiser<B::InnerBackend>>,
    registry:  &DirectoryRegistry<B>,
    device:    B::Device,
) -> Result<History>
where
    B: AutodiffBackend,
    O: Optimizer<ConvDenoiser<B>, B>,
{
    let registry: &dyn PretrainedRegistry<ConvDenoiser<B>> = registry;
    let (mut solver, state) = Solver::new(
        cfg.clone(),
        model,
        objective,
        optimizer,
        collab,
        Some(registry),
        device,
    )?;
    let state = solver.train(state).context("Training failed")?;
    Ok(state.history)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::write_mono;
    use std::{fs, path::Path};

    fn dataset(root: &Path, name: &str, clips: &[(&str, usize)]) -> std::path::PathBuf {
        let dir = root.join(name);
        for sub in ["noisy", "clean"] {
            fs::create_dir_all(dir.join(sub)).unwrap();
        }
        for &(file, len) in clips {
            let clean: Vec<f32> = (0..len).map(|t| (t as f32 * 0.05).sin() * 0.5).collect();
            let noisy: Vec<f32> = clean.iter().enumerate().map(|(t, c)| c + (t as f32 * 1.3).cos() * 0.05).collect();
            write_mono(&dir.join("noisy").join(file), &noisy, 16_000).unwrap();
            write_mono(&dir.join("clean").join(file), &clean, 16_000).unwrap();
        }
        dir
    }

    fn config(root: &Path) -> TrainConfig {
        let mut cfg = TrainConfig::default();
        cfg.epochs = 1;
        cfg.eval_every = 1;
        cfg.data.train_dir = dataset(root, "train", &[("a.wav", 3200), ("b.wav", 3200)]);
        cfg.data.segment = 0.1;
        cfg.data.stride = 0.1;
        cfg.data.batch_size = 2;
        // Default shift is longer than a 0.1 s segment
        cfg.augment.shift = 0;
        cfg.augment.bandmask = 0.0;
        cfg.checkpoint.checkpoint_file = root.join("checkpoint.th");
        cfg.checkpoint.best_file = root.join("best.th");
        cfg.checkpoint.history_file = root.join("history.json");
        cfg.checkpoint.checkpoints_dir = root.join("checkpoints");
        cfg.checkpoint.pretrained_dir = root.join("pretrained");
        cfg.samples_dir = root.join("samples");
        cfg.metrics_file = root.join("metrics.csv");
        cfg
    }

    #[test]
    fn test_test_dir_enhances_samples_at_evaluation() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path());
        cfg.data.test_dir = Some(dataset(root.path(), "test", &[("t1.wav", 1000)]));

        let history = TrainUseCase::new(cfg).execute().unwrap();
        assert_eq!(history.len(), 1);
        assert!(history.last().unwrap().pesq.is_none());
        assert!(root.path().join("samples/t1_noisy.wav").exists());
        assert!(root.path().join("samples/t1_enhanced.wav").exists());
        assert!(root.path().join("checkpoint.th").exists());
    }

    #[test]
    fn test_short_validation_clip_is_rejected_before_training() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path());
        cfg.loss.stft_loss = true;
        cfg.data.valid_dir = Some(dataset(root.path(), "valid", &[("short.wav", 800)]));

        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(err.to_string().contains("'short.wav' has 800 samples"), "{err}");
        assert!(!root.path().join("checkpoint.th").exists());
    }
}
