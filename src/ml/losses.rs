// ============================================================
// Layer 5 — Loss Composition
// ============================================================
// Builds the training objective from its enabled parts:
//
//   enhancement = base(clean, estimate)              l1 | l2 | huber
//               + stft_weight · (sc + mag)           if spectral loss on
//   acoustic    = ac_weight · AcousticLoss(clean, estimate, mode)
//                                                    if acoustic loss on
//   total       = enhancement + acoustic
//
// In acoustic-only mode the enhancement term is skipped and
// reported as 0, so total == acoustic. That mode needs the
// acoustic loss, which `Objective::new` enforces.

use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};

use crate::domain::{
    error::{ConfigError, TrainError},
    kinds::{EnhancementLossKind, Mode},
};
use crate::ml::{
    acoustic_loss::AcousticLoss, contracts::AcousticEstimator, stft_loss::MultiResolutionStftLoss,
};

/// Base waveform loss, averaged over every sample of the batch.
pub fn enhancement_loss<B: Backend>(
    kind:     EnhancementLossKind,
    clean:    Tensor<B, 2>,
    estimate: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let diff = estimate - clean;
    match kind {
        EnhancementLossKind::L1 => diff.abs().mean(),
        EnhancementLossKind::L2 => diff.powf_scalar(2.0).mean(),
        EnhancementLossKind::Huber => {
            // Quadratic below 1, linear above
            let abs = diff.abs();
            let quad = abs.clone().clamp_max(1.0);
            (quad.clone().powf_scalar(2.0).mul_scalar(0.5) + (abs - quad)).mean()
        }
    }
}

/// A loss together with the weight it enters the objective with.
#[derive(Debug, Clone)]
pub struct Weighted<L> {
    pub loss:   L,
    pub weight: f64,
}

impl<L> Weighted<L> {
    pub fn new(loss: L, weight: f64) -> Self {
        Self { loss, weight }
    }
}

/// The three scalars reported per batch.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub total:       Tensor<B, 1>,
    pub enhancement: Tensor<B, 1>,
    pub acoustic:    Tensor<B, 1>,
}

#[derive(Debug, Clone)]
pub struct Objective<B: Backend, E> {
    kind:          EnhancementLossKind,
    spectral:      Option<Weighted<MultiResolutionStftLoss<B>>>,
    acoustic:      Option<Weighted<AcousticLoss<B, E>>>,
    acoustic_only: bool,
}

impl<B: Backend, E: AcousticEstimator<B>> Objective<B, E> {
    pub fn new(
        kind:          EnhancementLossKind,
        spectral:      Option<Weighted<MultiResolutionStftLoss<B>>>,
        acoustic:      Option<Weighted<AcousticLoss<B, E>>>,
        acoustic_only: bool,
    ) -> Result<Self, ConfigError> {
        if acoustic_only && acoustic.is_none() {
            return Err(ConfigError::AcousticOnlyWithoutAcousticLoss);
        }
        Ok(Self { kind, spectral, acoustic, acoustic_only })
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.acoustic_only {
            parts.push(self.kind.to_string());
            if let Some(s) = &self.spectral {
                parts.push(format!("{} * mrstft", s.weight));
            }
        }
        if let Some(a) = &self.acoustic {
            parts.push(format!("{} * acoustic[{}]", a.weight, a.loss.kind()));
        }
        parts.join(" + ")
    }

    /// Signals must be strictly longer than this for every
    /// spectral term of the objective.
    pub fn min_samples(&self) -> usize {
        let spectral = match (&self.spectral, self.acoustic_only) {
            (Some(s), false) => s.loss.min_samples(),
            _ => 0,
        };
        let acoustic = self.acoustic.as_ref().map_or(0, |a| a.loss.min_samples());
        spectral.max(acoustic)
    }

    pub fn compute(
        &self,
        clean:    Tensor<B, 2>,
        estimate: Tensor<B, 2>,
        mode:     Mode,
    ) -> Result<LossTerms<B>, TrainError> {
        let device = estimate.device();

        let acoustic = match &self.acoustic {
            Some(a) => a
                .loss
                .compute(clean.clone(), estimate.clone(), mode)?
                .mul_scalar(a.weight),
            None => Tensor::zeros([1], &device),
        };

        if self.acoustic_only {
            return Ok(LossTerms {
                total:       acoustic.clone(),
                enhancement: Tensor::zeros([1], &device),
                acoustic,
            });
        }

        let mut enhancement = enhancement_loss(self.kind, clean.clone(), estimate.clone());
        if let Some(s) = &self.spectral {
            let (sc, mag) = s.loss.forward(estimate, clean)?;
            enhancement = enhancement + (sc + mag).mul_scalar(s.weight);
        }

        let total = if self.acoustic.is_some() {
            enhancement.clone() + acoustic.clone()
        } else {
            enhancement.clone()
        };
        Ok(LossTerms { total, enhancement, acoustic })
    }
}

impl<B, E> Objective<B, E>
where
    B: AutodiffBackend,
    E: AcousticEstimator<B> + AutodiffModule<B>,
    E::InnerModule: AcousticEstimator<B::InnerBackend>,
{
    /// The same objective on the inner backend, for validation.
    pub fn valid(&self) -> Objective<B::InnerBackend, E::InnerModule> {
        Objective {
            kind:          self.kind,
            spectral:      self.spectral.as_ref().map(|s| Weighted::new(s.loss.valid(), s.weight)),
            acoustic:      self.acoustic.as_ref().map(|a| Weighted::new(a.loss.valid(), a.weight)),
            acoustic_only: self.acoustic_only,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{
        baseline::{FrameEstimator, FrameEstimatorConfig},
        stft::StftConfig,
    };
    use crate::domain::kinds::AcousticLossKind;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;
    type Est = FrameEstimator<TestBackend>;

    fn row(values: &[f32]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(values.to_vec(), [1, values.len()]), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    fn wave(len: usize, freq: f32) -> Vec<f32> {
        (0..len).map(|t| (t as f32 * freq).sin() * 0.5).collect()
    }

    #[test]
    fn test_base_losses_on_known_batch() {
        let clean = [0.0, 0.0, 0.0, 0.0];
        let est = [0.5, -2.0, 1.0, 0.0];
        let l1 = scalar(enhancement_loss(EnhancementLossKind::L1, row(&clean), row(&est)));
        let l2 = scalar(enhancement_loss(EnhancementLossKind::L2, row(&clean), row(&est)));
        let hub = scalar(enhancement_loss(EnhancementLossKind::Huber, row(&clean), row(&est)));
        assert!((l1 - 3.5 / 4.0).abs() < 1e-6);
        assert!((l2 - 5.25 / 4.0).abs() < 1e-6);
        // 0.125 + 1.5 + 0.5 + 0
        assert!((hub - 2.125 / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_perfect_estimate_gives_zero_everywhere() {
        let objective = Objective::<TestBackend, Est>::new(EnhancementLossKind::L1, None, None, false).unwrap();
        let terms = objective.compute(row(&[1.0, 1.0]), row(&[1.0, 1.0]), Mode::Train).unwrap();
        assert_eq!(scalar(terms.total), 0.0);
        assert_eq!(scalar(terms.enhancement), 0.0);
        assert_eq!(scalar(terms.acoustic), 0.0);
    }

    #[test]
    fn test_acoustic_only_requires_acoustic_loss() {
        let err = Objective::<TestBackend, Est>::new(EnhancementLossKind::L2, None, None, true).unwrap_err();
        assert!(matches!(err, ConfigError::AcousticOnlyWithoutAcousticLoss));
    }

    #[test]
    fn test_spectral_term_is_added_with_its_weight() {
        let device = Default::default();
        let mrstft = MultiResolutionStftLoss::with_resolutions(
            &[StftConfig::hann(64, 16, 64)],
            0.5,
            0.5,
            &device,
        );
        let (clean, est) = (wave(256, 0.2), wave(256, 0.5));
        let (sc, mag) = mrstft.forward(row(&est), row(&clean)).unwrap();
        let spectral = scalar(sc) + scalar(mag);
        let base = scalar(enhancement_loss(EnhancementLossKind::L2, row(&clean), row(&est)));

        let objective = Objective::<TestBackend, Est>::new(
            EnhancementLossKind::L2,
            Some(Weighted::new(mrstft, 2.0)),
            None,
            false,
        )
        .unwrap();
        let terms = objective.compute(row(&clean), row(&est), Mode::Train).unwrap();
        assert!((scalar(terms.total) - (base + 2.0 * spectral)).abs() < 1e-4);
        assert_eq!(scalar(terms.acoustic), 0.0);
    }

    #[test]
    fn test_acoustic_only_reports_zero_enhancement() {
        let device = Default::default();
        let est = FrameEstimatorConfig::new().with_hidden(8).with_outputs(3).init(&device);
        let acoustic = AcousticLoss::new(AcousticLossKind::L1, est, &device);
        let (clean, enh) = (wave(1600, 0.05), wave(1600, 0.11));
        let expected = 3.0 * scalar(acoustic.compute(row(&clean), row(&enh), Mode::Eval).unwrap());

        let objective = Objective::new(
            EnhancementLossKind::L1,
            None,
            Some(Weighted::new(acoustic, 3.0)),
            true,
        )
        .unwrap();
        let terms = objective.compute(row(&clean), row(&enh), Mode::Eval).unwrap();
        assert_eq!(scalar(terms.enhancement), 0.0);
        assert!((scalar(terms.total) - expected).abs() < 1e-6);
        assert!((scalar(terms.acoustic) - expected).abs() < 1e-6);
        assert!(objective.describe().contains("acoustic[l1]"));
    }

    #[test]
    fn test_short_clip_is_an_error_not_a_panic() {
        let device = Default::default();
        let objective = Objective::<TestBackend, Est>::new(
            EnhancementLossKind::L1,
            Some(Weighted::new(MultiResolutionStftLoss::new(0.5, 0.5, &device), 1.0)),
            None,
            false,
        )
        .unwrap();
        assert_eq!(objective.min_samples(), 1024);

        let clip = wave(800, 0.2);
        let err = objective.compute(row(&clip), row(&clip), Mode::Eval).err().unwrap();
        assert!(matches!(err, TrainError::SignalTooShort { n_fft: 2048, samples: 800 }));

        let plain = Objective::<TestBackend, Est>::new(EnhancementLossKind::L1, None, None, false).unwrap();
        assert_eq!(plain.min_samples(), 0);
        assert!(plain.compute(row(&clip), row(&clip), Mode::Eval).is_ok());
    }
}
