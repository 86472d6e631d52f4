// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Files and process-level concerns the solver relies on through
// its collaborator traits:
//
//   checkpoint.rs — single-file checkpoint package, written
//                   atomically; Burn records as binary sections
//
//   metrics.rs    — CSV scalar log (MetricsSink) and the JSON
//                   history file
//
//   progress.rs   — periodic progress lines (ProgressReporter)
//
//   distrib.rs    — single-process worker group and the
//                   weighted cross-worker mean
//
//   pretrained.rs — named pretrained weights from a directory
//
//   samples.rs    — noisy/enhanced WAV pairs of the test set
//                   (SampleEnhancer)

/// Checkpoint package format and atomic writes
pub mod checkpoint;

/// Metrics CSV and history file
pub mod metrics;

/// Log-based progress reporter
pub mod progress;

/// Worker group
pub mod distrib;

/// Pretrained weight registry
pub mod pretrained;

/// Enhanced test-set samples
pub mod samples;
