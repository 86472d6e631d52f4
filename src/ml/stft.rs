// ============================================================
// Layer 5 — Spectral Transform
// ============================================================
// Differentiable short-time Fourier transform on Burn tensors.
//
//   waveform [batch, samples]
//     → centred frames with reflect padding of n_fft/2  (gather)
//     → windowed DFT against a precomputed basis        (matmul)
//     → [batch, frames, 2 * (n_fft/2 + 1)]
//
// The frequency axis interleaves real and imaginary parts:
//   re_0, im_0, re_1, im_1, ..., re_{n/2}, im_{n/2}
//
// frames = 1 + samples / hop. Both steps are plain tensor ops so
// gradients flow back to the waveform.
//
// Short-time energy of a frame is (2 / n_fft) * Σ_k |X_k|² over
// the one-sided spectrum. For a frame whose DC and Nyquist bins
// vanish that is exactly the time-domain Σ x² (Parseval).

use burn::{
    prelude::*,
    tensor::{backend::AutodiffBackend, TensorData},
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::domain::error::TrainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    Rectangular,
    /// Periodic Hann window
    Hann,
}

impl Window {
    fn coefficients(self, length: usize) -> Vec<f64> {
        match self {
            Window::Rectangular => vec![1.0; length],
            Window::Hann => (0..length)
                .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / length as f64).cos())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StftConfig {
    pub n_fft:      usize,
    pub hop:        usize,
    pub win_length: usize,
    pub window:     Window,
}

impl StftConfig {
    /// 32 ms rectangular frames every 10 ms at 16 kHz.
    pub fn acoustic() -> Self {
        Self { n_fft: 512, hop: 160, win_length: 512, window: Window::Rectangular }
    }

    pub fn hann(n_fft: usize, hop: usize, win_length: usize) -> Self {
        Self { n_fft, hop, win_length, window: Window::Hann }
    }

    /// Number of one-sided frequency bins
    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn frames(&self, samples: usize) -> usize {
        1 + samples / self.hop
    }

    /// Inputs must be strictly longer than this.
    pub fn min_samples(&self) -> usize {
        self.n_fft / 2
    }

    /// Window of `win_length` centred inside `n_fft` zeros.
    fn padded_window(&self) -> Vec<f64> {
        let win = self.win_length.min(self.n_fft);
        let left = (self.n_fft - win) / 2;
        let mut padded = vec![0.0; self.n_fft];
        for (i, w) in self.window.coefficients(win).into_iter().enumerate() {
            padded[left + i] = w;
        }
        padded
    }

    /// `[n_fft, 2 * bins]` windowed DFT matrix, columns interleaved re/im.
    fn basis(&self) -> Vec<f32> {
        let n = self.n_fft;
        let bins = self.bins();
        let window = self.padded_window();
        let mut basis = vec![0.0f32; n * 2 * bins];
        for t in 0..n {
            for k in 0..bins {
                let angle = 2.0 * PI * ((k * t) % n) as f64 / n as f64;
                basis[t * 2 * bins + 2 * k]     = (window[t] * angle.cos()) as f32;
                basis[t * 2 * bins + 2 * k + 1] = (-window[t] * angle.sin()) as f32;
            }
        }
        basis
    }

    /// Source sample for every (frame, offset), reflect padded.
    fn frame_indices(&self, samples: usize) -> Vec<i32> {
        let pad = (self.n_fft / 2) as i64;
        let len = samples as i64;
        let frames = self.frames(samples);
        let mut idx = Vec::with_capacity(frames * self.n_fft);
        for f in 0..frames {
            for o in 0..self.n_fft {
                let mut src = (f * self.hop + o) as i64 - pad;
                if src < 0 {
                    src = -src;
                }
                if src >= len {
                    src = 2 * (len - 1) - src;
                }
                idx.push(src as i32);
            }
        }
        idx
    }
}

/// STFT bound to a device, with its DFT basis precomputed.
#[derive(Debug, Clone)]
pub struct Stft<B: Backend> {
    config: StftConfig,
    basis:  Tensor<B, 2>,
}

impl<B: Backend> Stft<B> {
    pub fn new(config: StftConfig, device: &B::Device) -> Self {
        let basis = Tensor::from_data(
            TensorData::new(config.basis(), [config.n_fft, 2 * config.bins()]),
            device,
        );
        Self { config, basis }
    }

    pub fn config(&self) -> &StftConfig {
        &self.config
    }

    /// `[batch, samples]` → `[batch, frames, 2 * bins]`, re/im interleaved.
    ///
    /// Reflect padding needs more input than the pad width, so
    /// `samples <= n_fft / 2` is rejected.
    pub fn forward(&self, x: Tensor<B, 2>) -> Result<Tensor<B, 3>, TrainError> {
        let [batch, samples] = x.dims();
        let cfg = &self.config;
        if samples <= cfg.min_samples() {
            return Err(TrainError::SignalTooShort { n_fft: cfg.n_fft, samples });
        }
        let frames = cfg.frames(samples);

        let indices = cfg.frame_indices(samples);
        let indices = Tensor::<B, 1, Int>::from_ints(indices.as_slice(), &x.device());

        Ok(x.select(1, indices)
            .reshape([batch * frames, cfg.n_fft])
            .matmul(self.basis.clone())
            .reshape([batch, frames, 2 * cfg.bins()]))
    }

    /// Spectrum plus per-frame short-time energy `[batch, frames]`.
    pub fn forward_with_energy(&self, x: Tensor<B, 2>) -> Result<(Tensor<B, 3>, Tensor<B, 2>), TrainError> {
        let spec = self.forward(x)?;
        let energy = frame_energy(spec.clone(), self.config.n_fft);
        Ok((spec, energy))
    }

    /// Magnitude spectrogram `[batch, frames, bins]`, floored at 1e-7
    /// before the square root.
    pub fn magnitude(&self, x: Tensor<B, 2>) -> Result<Tensor<B, 3>, TrainError> {
        let spec = self.forward(x)?;
        let [batch, frames, _] = spec.dims();
        let bins = self.config.bins();
        Ok(spec.reshape([batch, frames, bins, 2])
            .powf_scalar(2.0)
            .sum_dim(3)
            .reshape([batch, frames, bins])
            .clamp_min(1e-7)
            .sqrt())
    }
}

impl<B: AutodiffBackend> Stft<B> {
    /// Same transform on the inner backend, for validation passes.
    pub fn valid(&self) -> Stft<B::InnerBackend> {
        Stft { config: self.config, basis: self.basis.clone().inner() }
    }
}

/// `(2 / n_fft) * Σ (re² + im²)` over the interleaved frequency axis.
pub fn frame_energy<B: Backend>(spec: Tensor<B, 3>, n_fft: usize) -> Tensor<B, 2> {
    let [batch, frames, _] = spec.dims();
    spec.powf_scalar(2.0)
        .sum_dim(2)
        .reshape([batch, frames])
        .mul_scalar(2.0 / n_fft as f64)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small() -> StftConfig {
        StftConfig { n_fft: 64, hop: 16, win_length: 64, window: Window::Rectangular }
    }

    fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_output_shape_and_frame_count() {
        let device = Default::default();
        let stft = Stft::<TestBackend>::new(StftConfig::acoustic(), &device);
        let x = Tensor::<TestBackend, 2>::zeros([2, 1600], &device);
        let (spec, energy) = stft.forward_with_energy(x).unwrap();
        assert_eq!(spec.dims(), [2, 11, 514]);
        assert_eq!(energy.dims(), [2, 11]);
    }

    #[test]
    fn test_reflect_indices_at_both_edges() {
        let cfg = StftConfig { n_fft: 4, hop: 2, win_length: 4, window: Window::Rectangular };
        // samples 0..5, pad 2: padded = 2 1 | 0 1 2 3 4 | 3 2
        let idx = cfg.frame_indices(5);
        assert_eq!(cfg.frames(5), 3);
        assert_eq!(&idx[0..4], &[2, 1, 0, 1]);
        assert_eq!(&idx[8..12], &[2, 3, 4, 3]);
    }

    #[test]
    fn test_energy_matches_time_domain_for_bin_aligned_sine() {
        let device = Default::default();
        let cfg = small();
        let stft = Stft::<TestBackend>::new(cfg, &device);

        // Period of 16 samples puts the tone exactly on bin 4 of 64
        let samples = 256;
        let wave: Vec<f32> = (0..samples)
            .map(|t| (2.0 * std::f32::consts::PI * 4.0 * t as f32 / 64.0).sin())
            .collect();
        let x = Tensor::<TestBackend, 2>::from_data(TensorData::new(wave.clone(), [1, samples]), &device);
        let (_, energy) = stft.forward_with_energy(x).unwrap();
        let energy = to_vec(energy);

        // Interior frames never touch the reflected padding
        for f in 2..=14 {
            let start = f * cfg.hop - cfg.n_fft / 2;
            let expected: f32 = wave[start..start + cfg.n_fft].iter().map(|v| v * v).sum();
            assert_relative_eq!(energy[f], expected, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_first_frame_matches_naive_dft() {
        let device = Default::default();
        let cfg = StftConfig { n_fft: 8, hop: 4, win_length: 8, window: Window::Hann };
        let stft = Stft::<TestBackend>::new(cfg, &device);

        let wave: Vec<f32> = vec![0.3, -1.0, 0.5, 0.25, 2.0, -0.75, 1.5, 0.0, -0.5, 1.0];
        let x = Tensor::<TestBackend, 2>::from_data(TensorData::new(wave.clone(), [1, 10]), &device);
        let spec = to_vec(stft.forward(x).unwrap());

        let window = cfg.padded_window();
        let frame: Vec<f64> = cfg.frame_indices(10)[..8]
            .iter()
            .map(|&i| wave[i as usize] as f64)
            .collect();
        for k in 0..cfg.bins() {
            let (mut re, mut im) = (0.0, 0.0);
            for (t, &v) in frame.iter().enumerate() {
                let angle = 2.0 * PI * (k * t) as f64 / 8.0;
                re += window[t] * v * angle.cos();
                im -= window[t] * v * angle.sin();
            }
            assert_relative_eq!(spec[2 * k] as f64, re, epsilon = 1e-5);
            assert_relative_eq!(spec[2 * k + 1] as f64, im, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_magnitude_is_floored() {
        let device = Default::default();
        let stft = Stft::<TestBackend>::new(small(), &device);
        let x = Tensor::<TestBackend, 2>::zeros([1, 128], &device);
        let mag = to_vec(stft.magnitude(x).unwrap());
        for v in mag {
            assert_relative_eq!(v, 1e-7f32.sqrt(), max_relative = 1e-3);
        }
    }

    #[test]
    fn test_too_short_input_is_an_error() {
        let device = Default::default();
        let stft = Stft::<TestBackend>::new(small(), &device);
        let err = stft.forward(Tensor::<TestBackend, 2>::zeros([1, 32], &device)).unwrap_err();
        assert!(matches!(err, TrainError::SignalTooShort { n_fft: 64, samples: 32 }));
        assert!(stft.magnitude(Tensor::<TestBackend, 2>::zeros([1, 33], &device)).is_ok());
    }
}
