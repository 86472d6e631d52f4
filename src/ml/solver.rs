// ============================================================
// Layer 5 — Solver
// ============================================================
// Trains an enhancement model epoch by epoch and keeps enough on
// disk to pick the run up again after a crash.
//
// Construction decides where the weights come from:
//
//   checkpoint on, file present, no restart → resume that run
//                                              (weights, optimizer,
//                                              history, best state)
//   else continue_from given                → weights (latest or best
//                                              snapshot) and the best
//                                              snapshot, new history
//   else                                    → fresh
//   continue_pretrained given               → weights overwritten
//                                              from the registry
//
// One epoch:
//   train pass (autodiff backend, augmented, optimizer steps)
//   valid pass (inner backend via `valid()`, no gradients)
//   best-state snapshot, periodic evaluation on the test harness
//   history append, then history + checkpoint files on rank 0
//
// The model moves by value through every optimizer step, so the
// training state is threaded through `run_epoch` as a value too.

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, TensorData},
};
use ndarray::Array2;
use std::{path::Path, time::Instant};

use crate::application::config::TrainConfig;
use crate::domain::{
    error::{CheckpointError, TrainError},
    history::{EpochRecord, History},
    kinds::{Mode, OptimizerKind},
    traits::{
        Augment, BatchSource, Evaluator, MetricsSink, PretrainedRegistry, ProgressReporter,
        SampleEnhancer, WorkerGroup,
    },
    waveform::WaveBatch,
};
use crate::infra::{
    checkpoint::{
        decode_record, encode_record, periodic_path, CheckpointPackage, BEST_STATE, MODEL, OPTIMIZER,
    },
    metrics::save_history,
};
use crate::ml::{
    contracts::{AcousticEstimator, EnhancementModel, ModelDescriptor},
    losses::Objective,
    optim::clip_grad_norm,
};

// ─── Collaborators ────────────────────────────────────────────────────────────
/// Test-set evaluation, run every `eval_every` epochs on the
/// inner-backend model `IM`. Without an evaluator only samples
/// are written and the epoch records no scores.
pub struct TestHarness<IM> {
    pub evaluator: Option<Box<dyn Evaluator<IM>>>,
    pub enhancer:  Box<dyn SampleEnhancer<IM>>,
}

/// Everything the solver reads from or reports to.
pub struct Collaborators<IM> {
    pub train:    Box<dyn BatchSource>,
    pub valid:    Option<Box<dyn BatchSource>>,
    pub augment:  Box<dyn Augment>,
    pub metrics:  Box<dyn MetricsSink>,
    pub progress: Box<dyn ProgressReporter>,
    pub workers:  Box<dyn WorkerGroup>,
    pub test:     Option<TestHarness<IM>>,
}

// ─── Training state ───────────────────────────────────────────────────────────
/// Where the initial weights of a run came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeState {
    Fresh,
    ResumedFromCheckpoint,
    ResumedFromExternal { best: bool },
    FineTunedFromPretrained { name: String },
}

pub struct TrainingState<M> {
    pub model:      M,
    pub history:    History,
    /// Weights of the epoch with the lowest validation loss so far
    pub best_state: Option<M>,
    pub origin:     ResumeState,
}

impl<M> TrainingState<M> {
    fn fresh(model: M) -> Self {
        Self { model, history: History::new(), best_state: None, origin: ResumeState::Fresh }
    }
}

/// Worker-averaged losses of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassLosses {
    pub total:       f64,
    pub enhancement: f64,
    pub acoustic:    f64,
}

impl PassLosses {
    fn accumulate(&mut self, total: f64, enhancement: f64, acoustic: f64) {
        self.total += total;
        self.enhancement += enhancement;
        self.acoustic += acoustic;
    }

    fn means(&self, count: usize) -> [f64; 3] {
        let n = count.max(1) as f64;
        [self.total / n, self.enhancement / n, self.acoustic / n]
    }

    fn from_slice(values: &[f64]) -> Self {
        let at = |i: usize| values.get(i).copied().unwrap_or(0.0);
        Self { total: at(0), enhancement: at(1), acoustic: at(2) }
    }
}

// ─── Solver ───────────────────────────────────────────────────────────────────
pub struct Solver<B, M, O, E>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    config:             TrainConfig,
    objective:          Objective<B, E>,
    optim:              O,
    optim_kind:         OptimizerKind,
    collab:             Collaborators<M::InnerModule>,
    device:             B::Device,
    optimizer_restored: bool,
}

impl<B, M, O, E> Solver<B, M, O, E>
where
    B: AutodiffBackend,
    M: EnhancementModel<B> + AutodiffModule<B>,
    M::InnerModule: EnhancementModel<B::InnerBackend>,
    O: Optimizer<M, B>,
    E: AcousticEstimator<B> + AutodiffModule<B>,
    E::InnerModule: AcousticEstimator<B::InnerBackend>,
{
    /// Validate the config and resolve the initial training state.
    ///
    /// `model` is a freshly initialised template: checkpoint weights
    /// are loaded into it, and its descriptor must match the one
    /// stored in any checkpoint it is resumed from.
    pub fn new(
        config:    TrainConfig,
        model:     M,
        objective: Objective<B, E>,
        optim:     O,
        collab:    Collaborators<M::InnerModule>,
        registry:  Option<&dyn PretrainedRegistry<M>>,
        device:    B::Device,
    ) -> Result<(Self, TrainingState<M>)> {
        config.validate()?;
        if config.use_amp {
            tracing::warn!("Mixed precision was requested, training runs in full precision");
        }

        let (state, optim, optimizer_restored) =
            resume::<B, M, O>(&config, model, optim, registry, &device)?;
        tracing::info!("Objective: {}", objective.describe());
        tracing::info!("Initial state: {:?}", state.origin);

        let optim_kind = config.optim.optim;
        let solver = Self {
            config,
            objective,
            optim,
            optim_kind,
            collab,
            device,
            optimizer_restored,
        };
        Ok((solver, state))
    }

    /// True when optimizer state was loaded from the checkpoint.
    pub fn optimizer_restored(&self) -> bool {
        self.optimizer_restored
    }

    /// Run the remaining epochs, `history.len()..epochs`.
    pub fn train(&mut self, state: TrainingState<M>) -> Result<TrainingState<M>> {
        if self.config.checkpoint.save_again {
            self.serialize(&state)?;
            tracing::info!(
                "Re-serialised state to '{}'",
                self.config.checkpoint.checkpoint_file.display()
            );
            return Ok(state);
        }

        if !state.history.is_empty() {
            tracing::info!("Replaying metrics from previous run");
        }
        for (epoch, record) in state.history.records().iter().enumerate() {
            tracing::info!("Epoch {}: {}", epoch + 1, record.summary());
        }

        let mut state = state;
        for epoch in state.history.len()..self.config.epochs {
            state = self.run_epoch(epoch, state)?;
        }
        Ok(state)
    }

    fn run_epoch(&mut self, epoch: usize, state: TrainingState<M>) -> Result<TrainingState<M>> {
        let TrainingState { model, mut history, mut best_state, origin } = state;
        let start = Instant::now();

        // ── Training phase ────────────────────────────────────────────────────
        tracing::info!("{}", "-".repeat(70));
        tracing::info!("Training...");
        let (model, train) = self.train_pass(epoch, model, &history, best_state.as_ref())?;
        self.emit("train", &train, epoch)?;
        tracing::info!(
            "Train Summary | End of Epoch {} | Time {:.2}s | Train Loss {:.5} | Enhancement {:.5} | Acoustic {:.5}",
            epoch + 1,
            start.elapsed().as_secs_f64(),
            train.total,
            train.enhancement,
            train.acoustic
        );

        // ── Validation phase ──────────────────────────────────────────────────
        let valid = match self.valid_pass(epoch, &model)? {
            Some(valid) => {
                self.emit("valid", &valid, epoch)?;
                tracing::info!(
                    "Valid Summary | End of Epoch {} | Time {:.2}s | Valid Loss {:.5} | Enhancement {:.5} | Acoustic {:.5}",
                    epoch + 1,
                    start.elapsed().as_secs_f64(),
                    valid.total,
                    valid.enhancement,
                    valid.acoustic
                );
                valid.total
            }
            None => 0.0,
        };

        let best = history.best_with(valid);
        if valid == best {
            tracing::info!("New best valid loss {:.4}", valid);
            best_state = Some(model.clone());
        }

        // ── Test-set evaluation ───────────────────────────────────────────────
        let mut record = EpochRecord { train: train.total, valid, best, pesq: None, stoi: None };
        let due = (epoch + 1) % self.config.eval_every == 0 || epoch + 1 == self.config.epochs;
        if due {
            if let Some(test) = self.collab.test.as_mut() {
                tracing::info!("{}", "-".repeat(70));
                let current = model.valid();
                if let Some(evaluator) = test.evaluator.as_mut() {
                    tracing::info!("Evaluating on the test set...");
                    let scores = evaluator.evaluate(&current)?;
                    self.collab.metrics.add_scalar("pesq/test_pesq", scores.pesq, epoch)?;
                    self.collab.metrics.add_scalar("stoi/test_stoi", scores.stoi, epoch)?;
                    record.pesq = Some(scores.pesq);
                    record.stoi = Some(scores.stoi);
                }

                tracing::info!("Enhance and save samples...");
                test.enhancer.enhance(&current, &self.config.samples_dir)?;
            }
        }

        tracing::info!("{}", "-".repeat(70));
        tracing::info!("Overall Summary | Epoch {} | {}", epoch + 1, record.summary());
        history.push(record);

        // ── Persist ───────────────────────────────────────────────────────────
        let state = TrainingState { model, history, best_state, origin };
        if self.collab.workers.is_coordinator() {
            save_history(&self.config.checkpoint.history_file, &state.history)?;
            if self.config.checkpoint.checkpoint {
                if self.config.checkpoint.save_checkpoints {
                    self.save_periodic(epoch, &state.model, &state.history, state.best_state.as_ref())?;
                }
                self.serialize(&state)?;
                tracing::debug!(
                    "Checkpoint saved to '{}'",
                    self.config.checkpoint.checkpoint_file.display()
                );
            }
        }
        Ok(state)
    }

    fn train_pass(
        &mut self,
        epoch:      usize,
        mut model:  M,
        history:    &History,
        best_state: Option<&M>,
    ) -> Result<(M, PassLosses)> {
        self.collab.train.set_epoch(epoch);
        let total = self.collab.train.len();
        if total == 0 {
            return Err(TrainError::EmptyPass { phase: "train", epoch: epoch + 1 }.into());
        }

        let lr = self.config.optim.lr;
        let max_norm = self.config.optim.max_norm();
        let save_every = self.config.checkpoint.mid_epoch_save_every;
        let mid_epoch_saves =
            self.config.checkpoint.save_checkpoints && self.collab.workers.is_coordinator();

        self.collab.progress.begin(&format!("Train | Epoch {}", epoch + 1), total);
        let mut sums = PassLosses::default();
        let mut count = 0usize;

        for (i, batch) in self.collab.train.batches().enumerate() {
            let batch = WaveBatch::from_sources(self.collab.augment.augment(batch.into_sources())?)?;
            let noisy = to_tensor::<B>(&batch.noisy, &self.device);
            let clean = to_tensor::<B>(&batch.clean, &self.device);

            let estimate = model.forward(noisy);
            let terms = self.objective.compute(clean, estimate, Mode::Train)?;

            let loss = scalar(terms.total.clone());
            if self.config.detect_anomaly && !loss.is_finite() {
                return Err(TrainError::NonFiniteLoss { epoch: epoch + 1, batch: i + 1, value: loss }.into());
            }

            // Backward pass + optimizer update
            let mut grads = GradientsParams::from_grads(terms.total.backward(), &model);
            if let Some(max_norm) = max_norm {
                let (clipped, norm) = clip_grad_norm::<B, M>(&model, grads, max_norm);
                tracing::trace!("Gradient norm {:.4} at batch {}", norm, i + 1);
                grads = clipped;
            }
            model = self.optim.step(lr, model, grads);

            sums.accumulate(loss, scalar(terms.enhancement), scalar(terms.acoustic));
            count = i + 1;
            self.collab.progress.update(count, sums.total / count as f64);

            if mid_epoch_saves && count % save_every == 0 {
                self.save_periodic(epoch, &model, history, best_state)?;
            }
        }
        self.collab.progress.end();

        if count == 0 {
            return Err(TrainError::EmptyPass { phase: "train", epoch: epoch + 1 }.into());
        }
        let averaged = self.collab.workers.average(&sums.means(count), count)?;
        Ok((model, PassLosses::from_slice(&averaged)))
    }

    /// `None` when the run has no validation source.
    fn valid_pass(&mut self, epoch: usize, model: &M) -> Result<Option<PassLosses>> {
        let Some(source) = self.collab.valid.as_mut() else {
            return Ok(None);
        };
        tracing::info!("{}", "-".repeat(70));
        tracing::info!("Cross validation...");

        source.set_epoch(epoch);
        let total = source.len();
        if total == 0 {
            return Err(TrainError::EmptyPass { phase: "valid", epoch: epoch + 1 }.into());
        }

        // Inner backend: no autodiff graph, dropout off
        let model = model.valid();
        let objective = self.objective.valid();

        self.collab.progress.begin(&format!("Valid | Epoch {}", epoch + 1), total);
        let mut sums = PassLosses::default();
        let mut count = 0usize;
        for (i, batch) in source.batches().enumerate() {
            let noisy = to_tensor::<B::InnerBackend>(&batch.noisy, &self.device);
            let clean = to_tensor::<B::InnerBackend>(&batch.clean, &self.device);
            let terms = objective.compute(clean, model.forward(noisy), Mode::Eval)?;

            sums.accumulate(
                scalar(terms.total),
                scalar(terms.enhancement),
                scalar(terms.acoustic),
            );
            count = i + 1;
            self.collab.progress.update(count, sums.total / count as f64);
        }
        self.collab.progress.end();

        if count == 0 {
            return Err(TrainError::EmptyPass { phase: "valid", epoch: epoch + 1 }.into());
        }
        let averaged = self.collab.workers.average(&sums.means(count), count)?;
        Ok(Some(PassLosses::from_slice(&averaged)))
    }

    fn emit(&mut self, phase: &str, losses: &PassLosses, epoch: usize) -> Result<()> {
        let metrics = &mut self.collab.metrics;
        metrics.add_scalar(&format!("loss/{phase}_total_loss"), losses.total, epoch)?;
        metrics.add_scalar(&format!("loss/{phase}_enhancement_loss"), losses.enhancement, epoch)?;
        metrics.add_scalar(&format!("loss/{phase}_acoustic_loss"), losses.acoustic, epoch)?;
        Ok(())
    }

    // ─── Persistence ─────────────────────────────────────────────────────────
    fn package(&self, model: &M, history: &History, best_state: Option<&M>) -> Result<CheckpointPackage> {
        let config = serde_json::to_value(&self.config).context("Cannot snapshot the training config")?;
        let mut package = CheckpointPackage::new(model.descriptor(), history.clone(), config)
            .with_section(MODEL, encode_record::<B, _>(model.clone().into_record(), MODEL)?)
            .with_optimizer(
                self.optim_kind,
                encode_record::<B, _>(self.optim.to_record(), OPTIMIZER)?,
            );
        if let Some(best) = best_state {
            package = package.with_section(
                BEST_STATE,
                encode_record::<B, _>(best.clone().into_record(), BEST_STATE)?,
            );
        }
        Ok(package)
    }

    /// Checkpoint package plus the best file, both replaced atomically.
    fn serialize(&self, state: &TrainingState<M>) -> Result<()> {
        let ckpt = &self.config.checkpoint;
        self.package(&state.model, &state.history, state.best_state.as_ref())?
            .write(&ckpt.checkpoint_file)?;

        let best = state.best_state.as_ref().unwrap_or(&state.model);
        let config = serde_json::to_value(&self.config).context("Cannot snapshot the training config")?;
        CheckpointPackage::new(best.descriptor(), state.history.clone(), config)
            .with_section(MODEL, encode_record::<B, _>(best.clone().into_record(), MODEL)?)
            .write(&ckpt.best_file)?;
        Ok(())
    }

    fn save_periodic(&self, epoch: usize, model: &M, history: &History, best_state: Option<&M>) -> Result<()> {
        let path = periodic_path(&self.config.checkpoint.checkpoints_dir, epoch + 1);
        self.package(model, history, best_state)?.write(&path)?;
        tracing::info!("Checkpoint Epoch {} is saved", epoch + 1);
        Ok(())
    }
}

// ─── Resume ───────────────────────────────────────────────────────────────────
/// Initial state of a run from (config, checkpoint on disk, template).
/// Also returns the optimizer, with its state restored when the
/// checkpoint holds state of the configured kind.
fn resume<B, M, O>(
    config:   &TrainConfig,
    template: M,
    optim:    O,
    registry: Option<&dyn PretrainedRegistry<M>>,
    device:   &B::Device,
) -> Result<(TrainingState<M>, O, bool)>
where
    B: AutodiffBackend,
    M: EnhancementModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let ckpt = &config.checkpoint;
    let mut optim = optim;
    let mut restored = false;

    let mut state = if ckpt.checkpoint && !ckpt.restart && ckpt.checkpoint_file.exists() {
        let path = ckpt.checkpoint_file.as_path();
        tracing::info!("Loading checkpoint model: {}", path.display());
        let package = CheckpointPackage::read(path)?;
        check_architecture(&package.architecture, &template.descriptor(), path)?;

        let best_state = match package.section(BEST_STATE) {
            Some(bytes) => {
                let record = decode_record::<B, M::Record>(bytes, BEST_STATE, device)?;
                Some(template.clone().load_record(record))
            }
            None => None,
        };
        let record = decode_record::<B, M::Record>(package.require(MODEL, path)?, MODEL, device)?;
        let model = template.load_record(record);

        match (package.optimizer_kind, package.section(OPTIMIZER)) {
            (Some(kind), Some(bytes)) if kind == config.optim.optim => {
                let record = decode_record::<B, O::Record>(bytes, OPTIMIZER, device)?;
                optim = optim.load_record(record);
                restored = true;
            }
            (Some(kind), _) => tracing::warn!(
                "Checkpoint holds {} optimizer state, the run uses {}; starting the optimizer fresh",
                kind,
                config.optim.optim
            ),
            (None, _) => {}
        }

        TrainingState {
            model,
            history: package.history,
            best_state,
            origin: ResumeState::ResumedFromCheckpoint,
        }
    } else if let Some(from) = &ckpt.continue_from {
        tracing::info!("Loading checkpoint model: {}", from.display());
        let package = CheckpointPackage::read(from)?;
        check_architecture(&package.architecture, &template.descriptor(), from)?;

        let best_state = match package.section(BEST_STATE) {
            Some(bytes) => {
                let record = decode_record::<B, M::Record>(bytes, BEST_STATE, device)?;
                Some(template.clone().load_record(record))
            }
            None => None,
        };
        let section = if ckpt.continue_best { BEST_STATE } else { MODEL };
        let record = decode_record::<B, M::Record>(package.require(section, from)?, section, device)?;
        TrainingState {
            best_state,
            origin: ResumeState::ResumedFromExternal { best: ckpt.continue_best },
            ..TrainingState::fresh(template.load_record(record))
        }
    } else {
        TrainingState::fresh(template)
    };

    if let Some(name) = &ckpt.continue_pretrained {
        tracing::info!("Fine tuning from pre-trained model {}", name);
        let registry = registry
            .with_context(|| format!("Pretrained model '{name}' requested but no registry is available"))?;
        state.model = registry.fetch(name, state.model)?;
        state.origin = ResumeState::FineTunedFromPretrained { name: name.clone() };
    }

    Ok((state, optim, restored))
}

fn check_architecture(
    stored:  &ModelDescriptor,
    current: &ModelDescriptor,
    path:    &Path,
) -> Result<(), CheckpointError> {
    if stored == current {
        return Ok(());
    }
    Err(CheckpointError::ArchitectureMismatch {
        path:    path.to_path_buf(),
        stored:  format!("{} {}", stored.name, stored.config),
        current: format!("{} {}", current.name, current.config),
    })
}

fn to_tensor<B: Backend>(array: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = array.dim();
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, [rows, cols]), device)
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
