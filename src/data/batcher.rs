// ============================================================
// Layer 4 — Waveform Batcher
// ============================================================
// Implements Burn's Batcher trait to stack PairedSamples into a
// WaveBatch of shape [batch, samples].
//
// Training examples all share the segment length. Validation
// examples are whole clips of different lengths, so every row
// is zero padded on the right up to the longest one in the
// batch.
//
// The batch stays on the host (ndarray): augmentation runs
// before anything is moved to the training device.

use burn::data::dataloader::batcher::Batcher;
use ndarray::Array2;

use crate::data::dataset::PairedSample;
use crate::domain::waveform::WaveBatch;

#[derive(Clone, Debug, Default)]
pub struct WaveformBatcher;

impl WaveformBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Batcher<PairedSample, WaveBatch> for WaveformBatcher {
    fn batch(&self, items: Vec<PairedSample>) -> WaveBatch {
        let rows = items.len();
        let cols = items.iter().map(|s| s.noisy.len()).max().unwrap_or(0);

        let mut noisy = Array2::<f32>::zeros((rows, cols));
        let mut clean = Array2::<f32>::zeros((rows, cols));

        for (r, sample) in items.iter().enumerate() {
            for (c, &v) in sample.noisy.iter().enumerate() {
                noisy[[r, c]] = v;
            }
            for (c, &v) in sample.clean.iter().enumerate() {
                clean[[r, c]] = v;
            }
        }

        WaveBatch { noisy, clean }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_padded_to_longest() {
        let batch = WaveformBatcher::new().batch(vec![
            PairedSample { noisy: vec![1.0, 2.0, 3.0], clean: vec![0.5, 0.5, 0.5] },
            PairedSample { noisy: vec![4.0], clean: vec![1.0] },
        ]);
        assert_eq!(batch.noisy.dim(), (2, 3));
        assert_eq!(batch.noisy.row(1).to_vec(), vec![4.0, 0.0, 0.0]);
        assert_eq!(batch.clean.row(0).to_vec(), vec![0.5, 0.5, 0.5]);
    }
}
