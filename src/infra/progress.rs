// ============================================================
// Layer 6 — Progress Logging
// ============================================================
// Logs a bounded number of progress lines per pass instead of
// one per batch:
//
//   Train | Epoch 3 | 250/1000 | 12.4 it/sec | Loss 0.04121
//
// With `updates` = N, a line is emitted every total / N batches,
// so about N lines per pass.

use std::time::Instant;

use crate::domain::traits::ProgressReporter;

pub struct LogProgress {
    updates:   usize,
    name:      String,
    total:     usize,
    log_every: usize,
    started:   Instant,
    logged:    usize,
}

impl LogProgress {
    pub fn new(updates: usize) -> Self {
        Self {
            updates,
            name: String::new(),
            total: 0,
            log_every: 0,
            started: Instant::now(),
            logged: 0,
        }
    }

    /// Lines emitted during the current pass
    pub fn logged(&self) -> usize {
        self.logged
    }

    fn speed(&self, done: usize) -> String {
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 { done as f64 / elapsed } else { f64::INFINITY };
        if speed < 1e-4 {
            "oo sec/it".to_string()
        } else if speed < 0.1 {
            format!("{:.1} sec/it", 1.0 / speed)
        } else {
            format!("{speed:.1} it/sec")
        }
    }
}

impl ProgressReporter for LogProgress {
    fn begin(&mut self, name: &str, total: usize) {
        self.name = name.to_string();
        self.total = total;
        self.log_every = if self.updates == 0 { 0 } else { total / self.updates };
        self.started = Instant::now();
        self.logged = 0;
    }

    fn update(&mut self, done: usize, running_loss: f64) {
        if done == 0 || self.log_every == 0 || done % self.log_every != 0 {
            return;
        }
        self.logged += 1;
        tracing::info!(
            "{} | {}/{} | {} | Loss {:.5}",
            self.name,
            done,
            self.total,
            self.speed(done),
            running_loss
        );
    }

    fn end(&mut self) {
        tracing::debug!("{} | finished after {:.2}s", self.name, self.started.elapsed().as_secs_f64());
    }
}
