// ============================================================
// Layer 3 — Waveform Batches
// ============================================================
// A batch as produced by the data layer: two aligned matrices
// of shape [batch, samples]. The training pass converts it to
// the stacked source form [2, batch, samples] = [noise, clean]
// for augmentation and back again.

use anyhow::{ensure, Result};
use ndarray::{s, Array2, Array3};

#[derive(Debug, Clone, PartialEq)]
pub struct WaveBatch {
    pub noisy: Array2<f32>,
    pub clean: Array2<f32>,
}

impl WaveBatch {
    pub fn new(noisy: Array2<f32>, clean: Array2<f32>) -> Result<Self> {
        ensure!(
            noisy.dim() == clean.dim(),
            "noisy {:?} and clean {:?} batches differ in shape",
            noisy.dim(),
            clean.dim()
        );
        Ok(Self { noisy, clean })
    }

    pub fn batch_size(&self) -> usize {
        self.noisy.nrows()
    }

    pub fn samples(&self) -> usize {
        self.noisy.ncols()
    }

    /// `[noise = noisy - clean, clean]` stacked on a new leading axis.
    pub fn into_sources(self) -> Array3<f32> {
        let (batch, samples) = self.noisy.dim();
        let mut sources = Array3::zeros((2, batch, samples));
        sources.slice_mut(s![0, .., ..]).assign(&(&self.noisy - &self.clean));
        sources.slice_mut(s![1, .., ..]).assign(&self.clean);
        sources
    }

    /// Inverse of `into_sources`: `noisy = noise + clean`.
    pub fn from_sources(sources: Array3<f32>) -> Result<Self> {
        ensure!(
            sources.dim().0 == 2,
            "expected two stacked sources, got {}",
            sources.dim().0
        );
        let noise = sources.slice(s![0, .., ..]);
        let clean = sources.slice(s![1, .., ..]).to_owned();
        let noisy = &noise + &clean;
        Ok(Self { noisy, clean })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sources_recombine_to_noisy() {
        let batch = WaveBatch::new(
            array![[1.0, 2.0, 3.0], [0.5, 0.5, 0.5]],
            array![[0.5, 1.0, 1.0], [0.0, 0.5, 1.0]],
        )
        .unwrap();
        let sources = batch.clone().into_sources();
        assert_eq!(sources.dim(), (2, 2, 3));
        assert_eq!(sources[[0, 0, 2]], 2.0);

        let back = WaveBatch::from_sources(sources).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let err = WaveBatch::new(Array2::zeros((2, 4)), Array2::zeros((2, 5)));
        assert!(err.is_err());
    }
}
