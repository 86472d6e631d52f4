// ============================================================
// Layer 3 — Collaborator Traits
// ============================================================
// The solver only talks to its surroundings through these
// traits. Default implementations live in the data and infra
// layers; tests swap in small in-memory doubles.
//
//   BatchSource        → data::sampler::ShardedLoader
//   Augment            → data::augment::AugmentPipeline
//   MetricsSink        → infra::metrics::CsvScalarLog
//   ProgressReporter   → infra::progress::LogProgress
//   WorkerGroup        → infra::distrib::SingleProcess
//   PretrainedRegistry → infra::pretrained::DirectoryRegistry
//   Evaluator          → injected by the embedding application
//   SampleEnhancer     → infra::samples::WavSampleWriter

use anyhow::Result;
use ndarray::Array3;
use std::path::Path;

use crate::domain::waveform::WaveBatch;

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// A finite, re-iterable stream of paired waveform batches.
pub trait BatchSource {
    /// Called before every pass so shuffling can depend on the epoch.
    fn set_epoch(&mut self, epoch: usize);

    /// Number of batches one pass will yield on this worker.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batches of the current epoch, in yield order.
    fn batches(&self) -> Box<dyn Iterator<Item = WaveBatch> + '_>;
}

// ─── Augment ──────────────────────────────────────────────────────────────────
/// Stochastic transform of stacked sources `[2, batch, samples]`
/// (noise first, clean second). The output keeps two sources and
/// the batch size; the sample count may shrink.
pub trait Augment {
    fn augment(&mut self, sources: Array3<f32>) -> Result<Array3<f32>>;
}

// ─── MetricsSink ──────────────────────────────────────────────────────────────
/// Named scalar series indexed by epoch.
pub trait MetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;
}

// ─── ProgressReporter ─────────────────────────────────────────────────────────
pub trait ProgressReporter {
    /// A pass named `name` with `total` batches is starting.
    fn begin(&mut self, name: &str, total: usize);

    /// `done` batches processed, `running_loss` is the cumulative mean.
    fn update(&mut self, done: usize, running_loss: f64);

    fn end(&mut self);
}

// ─── WorkerGroup ──────────────────────────────────────────────────────────────
/// The only cross-worker primitive the solver needs.
pub trait WorkerGroup {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Average `values` over all workers, each worker weighted by
    /// `count` (its number of batches).
    fn average(&self, values: &[f64], count: usize) -> Result<Vec<f64>>;

    /// Only the coordinator writes history and checkpoint files.
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }
}

// ─── Test-set collaborators ───────────────────────────────────────────────────
/// Perceptual quality of the current model on the test set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScores {
    pub pesq: f64,
    pub stoi: f64,
}

/// Owns a test set and scores a model on it.
pub trait Evaluator<M> {
    fn evaluate(&mut self, model: &M) -> Result<QualityScores>;
}

/// Writes enhanced versions of the test set under `out_dir`.
pub trait SampleEnhancer<M> {
    fn enhance(&mut self, model: &M, out_dir: &Path) -> Result<()>;
}

// ─── PretrainedRegistry ───────────────────────────────────────────────────────
/// Named pretrained weights, loaded into a freshly built model.
pub trait PretrainedRegistry<M> {
    fn fetch(&self, name: &str, template: M) -> Result<M>;
}
