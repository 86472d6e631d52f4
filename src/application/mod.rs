// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Turns a configuration into a running workflow. No tensor math
// and no printing here; the ml and data layers do the work and
// the CLI prints the results.
//
//   config.rs           — TrainConfig, its defaults and validation
//   train_use_case.rs   — build sources, model, objective; run the solver
//   history_use_case.rs — read a saved history file

/// Training options
pub mod config;

/// The training workflow
pub mod train_use_case;

/// Inspecting a finished or running training
pub mod history_use_case;
