// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer: the option
// enums recognised by the training configuration, the error
// taxonomy, the per-epoch history, waveform batches and the
// collaborator traits the solver is driven through.
//
// Nothing in here touches Burn tensors or the filesystem.

/// Configuration, checkpoint and training error types
pub mod error;

/// Loss, mode, optimizer and device selectors
pub mod kinds;

/// Per-epoch metric records and the run history
pub mod history;

/// Paired noisy/clean waveform batches
pub mod waveform;

/// Collaborator contracts consumed by the solver
pub mod traits;
