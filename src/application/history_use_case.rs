// ============================================================
// Layer 2 — HistoryUseCase
// ============================================================
// Reads the history file a training run rewrites every epoch
// and turns it into one summary line per epoch.

use anyhow::Result;
use std::path::PathBuf;

use crate::domain::history::History;
use crate::infra::metrics::load_history;

pub struct HistoryUseCase {
    path: PathBuf,
}

impl HistoryUseCase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<History> {
        load_history(&self.path)
    }

    /// `Epoch N: Train=... Valid=... Best=...` per recorded epoch.
    pub fn summary_lines(&self) -> Result<Vec<String>> {
        let history = self.load()?;
        Ok(history
            .records()
            .iter()
            .enumerate()
            .map(|(i, record)| format!("Epoch {}: {}", i + 1, record.summary()))
            .collect())
    }
}
