// ============================================================
// Layer 6 — Worker Group
// ============================================================
// Training may run as several data-parallel workers. The solver
// only needs two things from the group: this worker's rank (rank
// 0 writes files) and a weighted average of per-worker metrics.
//
// SingleProcess is the one-worker group used by the CLI. A
// multi-worker transport gathers every worker's (values, count)
// and reduces them with `weighted_mean`.

use anyhow::{ensure, Result};

use crate::domain::traits::WorkerGroup;

/// Average of per-worker metric vectors, each weighted by its count.
pub fn weighted_mean(contributions: &[(Vec<f64>, usize)]) -> Result<Vec<f64>> {
    let Some((first, _)) = contributions.first() else {
        return Ok(Vec::new());
    };
    let width = first.len();
    ensure!(
        contributions.iter().all(|(v, _)| v.len() == width),
        "workers reported metric vectors of different lengths"
    );

    let total: usize = contributions.iter().map(|(_, c)| c).sum();
    if total == 0 {
        return Ok(vec![0.0; width]);
    }
    let mut sums = vec![0.0; width];
    for (values, count) in contributions {
        for (sum, v) in sums.iter_mut().zip(values) {
            *sum += v * *count as f64;
        }
    }
    Ok(sums.into_iter().map(|s| s / total as f64).collect())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl WorkerGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn average(&self, values: &[f64], count: usize) -> Result<Vec<f64>> {
        if count == 0 {
            return Ok(values.to_vec());
        }
        weighted_mean(&[(values.to_vec(), count)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_by_batch_count() {
        let avg = weighted_mean(&[(vec![1.0, 10.0], 3), (vec![3.0, 20.0], 1)]).unwrap();
        assert_eq!(avg, vec![1.5, 12.5]);
    }

    #[test]
    fn test_mismatched_widths_are_rejected() {
        assert!(weighted_mean(&[(vec![1.0], 1), (vec![1.0, 2.0], 1)]).is_err());
    }

    #[test]
    fn test_single_process_is_identity() {
        let group = SingleProcess;
        assert!(group.is_coordinator());
        assert_eq!(group.average(&[0.25, 0.5], 7).unwrap(), vec![0.25, 0.5]);
    }
}
