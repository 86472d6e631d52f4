// ============================================================
// Layer 5 — Multi-Resolution STFT Loss
// ============================================================
// Spectral loss averaged over several STFT resolutions
// (Hann windows):
//
//   fft    1024  2048  512
//   hop     120   240   50
//   win     600  1200  240
//
// Per resolution, with X = |STFT(estimate)| and Y = |STFT(clean)|:
//
//   spectral convergence  ‖Y − X‖_F / ‖Y‖_F
//   log magnitude         mean |log Y − log X|
//
// Both terms are averaged over the resolutions and scaled by
// `factor_sc` / `factor_mag`. Magnitudes are floored before the
// square root so the logarithm stays finite on silence.

use burn::{prelude::*, tensor::backend::AutodiffBackend};

use crate::domain::error::TrainError;
use crate::ml::stft::{Stft, StftConfig};

pub const DEFAULT_RESOLUTIONS: [(usize, usize, usize); 3] =
    [(1024, 120, 600), (2048, 240, 1200), (512, 50, 240)];

#[derive(Debug, Clone)]
pub struct MultiResolutionStftLoss<B: Backend> {
    resolutions: Vec<Stft<B>>,
    factor_sc:   f64,
    factor_mag:  f64,
}

impl<B: Backend> MultiResolutionStftLoss<B> {
    pub fn new(factor_sc: f64, factor_mag: f64, device: &B::Device) -> Self {
        let configs = DEFAULT_RESOLUTIONS
            .iter()
            .map(|&(fft, hop, win)| StftConfig::hann(fft, hop, win))
            .collect::<Vec<_>>();
        Self::with_resolutions(&configs, factor_sc, factor_mag, device)
    }

    pub fn with_resolutions(
        configs:    &[StftConfig],
        factor_sc:  f64,
        factor_mag: f64,
        device:     &B::Device,
    ) -> Self {
        Self {
            resolutions: configs.iter().map(|&c| Stft::new(c, device)).collect(),
            factor_sc,
            factor_mag,
        }
    }

    /// Signals must be strictly longer than this for every resolution.
    pub fn min_samples(&self) -> usize {
        self.resolutions.iter().map(|s| s.config().min_samples()).max().unwrap_or(0)
    }

    /// `(sc, mag)` for `estimate` against `clean`, both `[batch, samples]`.
    pub fn forward(
        &self,
        estimate: Tensor<B, 2>,
        clean:    Tensor<B, 2>,
    ) -> Result<(Tensor<B, 1>, Tensor<B, 1>), TrainError> {
        let device = estimate.device();
        let mut sc  = Tensor::<B, 1>::zeros([1], &device);
        let mut mag = Tensor::<B, 1>::zeros([1], &device);

        for stft in &self.resolutions {
            let x = stft.magnitude(estimate.clone())?;
            let y = stft.magnitude(clean.clone())?;

            let num = (y.clone() - x.clone()).powf_scalar(2.0).sum().sqrt();
            let den = y.clone().powf_scalar(2.0).sum().sqrt();
            sc = sc + num / den;
            mag = mag + (y.log() - x.log()).abs().mean();
        }

        let n = self.resolutions.len().max(1) as f64;
        Ok((
            sc.mul_scalar(self.factor_sc / n),
            mag.mul_scalar(self.factor_mag / n),
        ))
    }
}

impl<B: AutodiffBackend> MultiResolutionStftLoss<B> {
    pub fn valid(&self) -> MultiResolutionStftLoss<B::InnerBackend> {
        MultiResolutionStftLoss {
            resolutions: self.resolutions.iter().map(Stft::valid).collect(),
            factor_sc:   self.factor_sc,
            factor_mag:  self.factor_mag,
        }
    }
}
