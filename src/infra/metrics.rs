// ============================================================
// Layer 6 — Metrics Files
// ============================================================
// Two files record the progress of a run:
//
//   metrics.csv   one `step,tag,value` row per scalar, appended as
//                 the solver emits them:
//                   step,tag,value
//                   0,loss/train_total_loss,0.412345
//                   0,loss/valid_total_loss,0.398765
//                   ...
//
//   history.json  the full per-epoch history, rewritten after every
//                 epoch (pretty JSON array)
//
// The CSV survives restarts: an existing file keeps its rows and
// new ones are appended below them.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::{history::History, traits::MetricsSink};
use crate::infra::checkpoint::write_atomic;

/// Appends scalar series to a CSV file.
pub struct CsvScalarLog {
    csv_path: PathBuf,
}

impl CsvScalarLog {
    /// Open (or create, with header) the CSV at `csv_path`.
    pub fn new(csv_path: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = csv_path.into();
        if let Some(dir) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "step,tag,value")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for CsvScalarLog {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{step},{tag},{value:.6}")?;
        tracing::trace!("{tag}[{step}] = {value:.6}");
        Ok(())
    }
}

/// Rewrite the history file atomically.
pub fn save_history(path: &Path, history: &History) -> Result<()> {
    let json = serde_json::to_string_pretty(history)?;
    write_atomic(path, json.as_bytes())
        .with_context(|| format!("Cannot write history to '{}'", path.display()))?;
    tracing::debug!("Saved {} epochs to '{}'", history.len(), path.display());
    Ok(())
}

pub fn load_history(path: &Path) -> Result<History> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read history from '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("'{}' is not a history file", path.display()))
}
