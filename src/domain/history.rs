// ============================================================
// Layer 3 — Training History
// ============================================================
// One record per completed epoch, in order. The history is the
// only progress counter of a run: a resumed run continues at
// epoch `history.len()`.
//
// Invariants kept by `History::push`:
//   - records are appended, never edited
//   - record k's `best` is the minimum `valid` of records 0..=k

use serde::{Deserialize, Serialize};

/// Metrics of a single completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Worker-averaged total training loss
    pub train: f64,

    /// Worker-averaged total validation loss (0 without a valid set)
    pub valid: f64,

    /// Lowest `valid` seen up to and including this epoch
    pub best: f64,

    /// Present only on epochs where the evaluator ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pesq: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stoi: Option<f64>,
}

impl EpochRecord {
    /// Human readable one-liner used when replaying and summarising
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Train={:.5} Valid={:.5} Best={:.5}",
            self.train, self.valid, self.best
        );
        if let Some(pesq) = self.pesq {
            line.push_str(&format!(" Pesq={pesq:.5}"));
        }
        if let Some(stoi) = self.stoi {
            line.push_str(&format!(" Stoi={stoi:.5}"));
        }
        line
    }
}

/// Ordered list of epoch records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    records: Vec<EpochRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best validation loss if `valid` were appended next.
    pub fn best_with(&self, valid: f64) -> f64 {
        self.records
            .iter()
            .map(|r| r.valid)
            .fold(valid, f64::min)
    }

    /// Append the record for the epoch that just finished.
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    /// Number of completed epochs
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }
}
