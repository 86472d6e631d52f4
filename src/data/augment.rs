// ============================================================
// Layer 4 — Waveform Augmentation
// ============================================================
// Stochastic transforms applied to training batches only. Every
// transform works on stacked sources of shape
// [2, batch, samples] where source 0 is the noise and source 1
// the clean speech; the solver rebuilds `noisy = noise + clean`
// afterwards.
//
//   Remix    — pair every clean utterance with the noise of
//              another batch item
//   BandMask — remove a random mel-spaced frequency band
//   Shift    — random time shift, output is `shift` samples shorter
//   RevEcho  — synthetic reverb; a share of the clean reverb is
//              moved into the noise
//
// The pipeline applies them in that order from one seeded RNG,
// so a given seed reproduces the same augmented batches.

use anyhow::{ensure, Result};
use ndarray::{s, Array2, Array3, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::domain::traits::Augment;

// ─── AugmentConfig ────────────────────────────────────────────────────────────
/// Which transforms run and how strong they are. A zero strength
/// (or `false`) disables the transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    pub remix:           bool,
    /// Maximum width of the masked band, as a fraction of `bands`
    pub bandmask:        f64,
    pub bands:           usize,
    /// Maximum shift in samples
    pub shift:           usize,
    /// Shift noise and clean by the same offset
    pub shift_same:      bool,
    /// Probability of adding reverb to a batch
    pub revecho:         f64,
    pub revecho_initial: f64,
    pub rt60:            (f64, f64),
    pub first_delay:     (f64, f64),
    pub repeat:          usize,
    pub jitter:          f64,
    pub keep_clean:      f64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            remix:           false,
            bandmask:        0.2,
            bands:           120,
            shift:           8000,
            shift_same:      true,
            revecho:         0.0,
            revecho_initial: 0.3,
            rt60:            (0.3, 1.3),
            first_delay:     (0.01, 0.03),
            repeat:          3,
            jitter:          0.1,
            keep_clean:      0.1,
        }
    }
}

// ─── SourceTransform ──────────────────────────────────────────────────────────
/// One step of the pipeline; draws from the pipeline's RNG.
pub trait SourceTransform: Send {
    fn name(&self) -> &'static str;

    fn apply(&self, sources: Array3<f32>, rng: &mut StdRng) -> Result<Array3<f32>>;
}

fn check_sources(sources: &Array3<f32>) -> Result<()> {
    ensure!(
        sources.dim().0 == 2,
        "augmentation expects [noise, clean] sources, got {} sources",
        sources.dim().0
    );
    Ok(())
}

// ─── Remix ────────────────────────────────────────────────────────────────────
/// Shuffles the noises across the batch. The clean source is untouched.
#[derive(Debug, Clone, Default)]
pub struct Remix;

impl SourceTransform for Remix {
    fn name(&self) -> &'static str {
        "remix"
    }

    fn apply(&self, sources: Array3<f32>, rng: &mut StdRng) -> Result<Array3<f32>> {
        check_sources(&sources)?;
        let batch = sources.dim().1;
        let mut perm: Vec<usize> = (0..batch).collect();
        perm.shuffle(rng);

        let noise = sources.index_axis(Axis(0), 0).select(Axis(0), &perm);
        let mut out = sources;
        out.index_axis_mut(Axis(0), 0).assign(&noise);
        Ok(out)
    }
}

// ─── BandMask ─────────────────────────────────────────────────────────────────
fn hz_to_mel(f: f64) -> f64 {
    2595.0 * (1.0 + f / 700.0).log10()
}

fn mel_to_hz(m: f64) -> f64 {
    700.0 * (10f64.powf(m / 2595.0) - 1.0)
}

/// `n` frequencies evenly spaced on the mel scale over [low, high] Hz.
pub fn mel_frequencies(n: usize, low: f64, high: f64) -> Vec<f64> {
    let (lo, hi) = (hz_to_mel(low), hz_to_mel(high));
    if n < 2 {
        return vec![mel_to_hz(lo); n];
    }
    (0..n)
        .map(|i| mel_to_hz(lo + (hi - lo) * i as f64 / (n - 1) as f64))
        .collect()
}

/// Zeroes a random band of up to `max_width * bands` mel bands.
#[derive(Debug, Clone)]
pub struct BandMask {
    max_width:   f64,
    bands:       usize,
    sample_rate: u32,
}

impl BandMask {
    pub fn new(max_width: f64, bands: usize, sample_rate: u32) -> Self {
        Self { max_width, bands, sample_rate }
    }

    /// Remove normalised frequencies in [low, high) from every row.
    fn mask_rows(sources: &mut Array3<f32>, low: f64, high: f64) -> Result<()> {
        let len = sources.dim().2;
        if len == 0 || high <= low {
            return Ok(());
        }
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let mut input = forward.make_input_vec();
        let mut spectrum = forward.make_output_vec();
        let mut output = inverse.make_output_vec();
        let scale = 1.0 / len as f32;

        for mut row in sources.lanes_mut(Axis(2)) {
            for (dst, &src) in input.iter_mut().zip(row.iter()) {
                *dst = src;
            }
            forward
                .process(&mut input, &mut spectrum)
                .map_err(|e| anyhow::anyhow!("band mask forward FFT: {e}"))?;

            for (k, bin) in spectrum.iter_mut().enumerate() {
                let freq = k as f64 / len as f64;
                if freq >= low && freq < high {
                    bin.re = 0.0;
                    bin.im = 0.0;
                }
            }
            spectrum[0].im = 0.0;
            if len % 2 == 0 {
                if let Some(last) = spectrum.last_mut() {
                    last.im = 0.0;
                }
            }

            inverse
                .process(&mut spectrum, &mut output)
                .map_err(|e| anyhow::anyhow!("band mask inverse FFT: {e}"))?;
            for (dst, &src) in row.iter_mut().zip(output.iter()) {
                *dst = src * scale;
            }
        }
        Ok(())
    }
}

impl SourceTransform for BandMask {
    fn name(&self) -> &'static str {
        "bandmask"
    }

    fn apply(&self, mut sources: Array3<f32>, rng: &mut StdRng) -> Result<Array3<f32>> {
        check_sources(&sources)?;
        if self.bands == 0 {
            return Ok(sources);
        }
        let width = (self.max_width.abs() * self.bands as f64) as usize;
        let mels: Vec<f64> = mel_frequencies(self.bands, 40.0, self.sample_rate as f64 / 2.0)
            .into_iter()
            .map(|f| f / self.sample_rate as f64)
            .collect();

        let low = rng.gen_range(0..self.bands);
        let upper = self.bands.min(low + width);
        let high = if upper > low { rng.gen_range(low..upper) } else { low };

        Self::mask_rows(&mut sources, mels[low], mels[high])?;
        Ok(sources)
    }
}

// ─── Shift ────────────────────────────────────────────────────────────────────
/// Crops `shift` samples at a random offset per batch item.
#[derive(Debug, Clone)]
pub struct Shift {
    shift: usize,
    same:  bool,
}

impl Shift {
    pub fn new(shift: usize, same: bool) -> Self {
        Self { shift, same }
    }
}

impl SourceTransform for Shift {
    fn name(&self) -> &'static str {
        "shift"
    }

    fn apply(&self, sources: Array3<f32>, rng: &mut StdRng) -> Result<Array3<f32>> {
        check_sources(&sources)?;
        if self.shift == 0 {
            return Ok(sources);
        }
        let (n_sources, batch, len) = sources.dim();
        ensure!(
            len > self.shift,
            "cannot shift by {} samples a batch of {} samples",
            self.shift,
            len
        );
        let out_len = len - self.shift;

        // One offset per batch item, or per (source, item) pair
        let offsets: Array2<usize> = if self.same {
            let per_item: Vec<usize> = (0..batch).map(|_| rng.gen_range(0..self.shift)).collect();
            Array2::from_shape_fn((n_sources, batch), |(_, b)| per_item[b])
        } else {
            Array2::from_shape_fn((n_sources, batch), |_| rng.gen_range(0..self.shift))
        };

        let mut out = Array3::<f32>::zeros((n_sources, batch, out_len));
        for src in 0..n_sources {
            for b in 0..batch {
                let off = offsets[[src, b]];
                out.slice_mut(s![src, b, ..])
                    .assign(&sources.slice(s![src, b, off..off + out_len]));
            }
        }
        Ok(out)
    }
}

// ─── RevEcho ──────────────────────────────────────────────────────────────────
/// Adds decaying echoes to both sources with probability `proba`.
///
/// Each of `repeat` echo trains starts at `initial * source` and is
/// delayed by ~`first_delay` seconds and attenuated until it has
/// decayed by 60 dB over `rt60` seconds. Noise keeps its reverb;
/// clean keeps `keep_clean` of its reverb and the rest goes to noise.
#[derive(Debug, Clone)]
pub struct RevEcho {
    proba:       f64,
    initial:     f64,
    rt60:        (f64, f64),
    first_delay: (f64, f64),
    repeat:      usize,
    jitter:      f64,
    keep_clean:  f64,
    sample_rate: u32,
}

impl RevEcho {
    pub fn from_config(cfg: &AugmentConfig, sample_rate: u32) -> Self {
        Self {
            proba:       cfg.revecho,
            initial:     cfg.revecho_initial,
            rt60:        cfg.rt60,
            first_delay: cfg.first_delay,
            repeat:      cfg.repeat,
            jitter:      cfg.jitter,
            keep_clean:  cfg.keep_clean,
            sample_rate,
        }
    }

    fn uniform(rng: &mut StdRng, (lo, hi): (f64, f64)) -> f64 {
        if hi > lo { rng.gen_range(lo..hi) } else { lo }
    }

    fn jittered(&self, rng: &mut StdRng) -> f64 {
        1.0 + self.jitter * rng.gen_range(-1.0..=1.0)
    }

    fn reverb(
        &self,
        source:      &Array2<f32>,
        initial:     f64,
        first_delay: f64,
        rt60:        f64,
        rng:         &mut StdRng,
    ) -> Array2<f32> {
        let len = source.ncols();
        let mut reverb = Array2::<f32>::zeros(source.raw_dim());
        for _ in 0..self.repeat {
            let mut frac = 1.0;
            let mut echo = source * initial as f32;
            while frac > 1e-3 {
                let delay = 1 + (self.jittered(rng) * first_delay * self.sample_rate as f64) as usize;
                let delay = delay.min(len);
                let mut delayed = Array2::<f32>::zeros(echo.raw_dim());
                delayed
                    .slice_mut(s![.., delay..])
                    .assign(&echo.slice(s![.., ..len - delay]));
                echo = delayed;
                reverb += &echo;

                let attenuation = 10f64.powf(-3.0 * self.jittered(rng) * first_delay / rt60);
                echo *= attenuation as f32;
                frac *= attenuation;
            }
        }
        reverb
    }
}

impl SourceTransform for RevEcho {
    fn name(&self) -> &'static str {
        "revecho"
    }

    fn apply(&self, sources: Array3<f32>, rng: &mut StdRng) -> Result<Array3<f32>> {
        check_sources(&sources)?;
        if rng.gen::<f64>() >= self.proba {
            return Ok(sources);
        }
        let initial     = rng.gen::<f64>() * self.initial;
        let first_delay = Self::uniform(rng, self.first_delay);
        let rt60        = Self::uniform(rng, self.rt60);

        let mut noise = sources.index_axis(Axis(0), 0).to_owned();
        let mut clean = sources.index_axis(Axis(0), 1).to_owned();

        let noise_reverb = self.reverb(&noise, initial, first_delay, rt60, rng);
        noise += &noise_reverb;
        let clean_reverb = self.reverb(&clean, initial, first_delay, rt60, rng);
        clean.scaled_add(self.keep_clean as f32, &clean_reverb);
        noise.scaled_add((1.0 - self.keep_clean) as f32, &clean_reverb);

        let mut out = sources;
        out.index_axis_mut(Axis(0), 0).assign(&noise);
        out.index_axis_mut(Axis(0), 1).assign(&clean);
        Ok(out)
    }
}

// ─── AugmentPipeline ──────────────────────────────────────────────────────────
/// The enabled transforms in order, sharing one seeded RNG.
pub struct AugmentPipeline {
    steps: Vec<Box<dyn SourceTransform>>,
    rng:   StdRng,
}

impl AugmentPipeline {
    pub fn new(steps: Vec<Box<dyn SourceTransform>>, seed: u64) -> Self {
        Self { steps, rng: StdRng::seed_from_u64(seed) }
    }

    /// Remix, band mask, shift and reverb, each only when enabled.
    pub fn from_config(cfg: &AugmentConfig, sample_rate: u32, seed: u64) -> Self {
        let mut steps: Vec<Box<dyn SourceTransform>> = Vec::new();
        if cfg.remix {
            steps.push(Box::new(Remix));
        }
        if cfg.bandmask > 0.0 {
            steps.push(Box::new(BandMask::new(cfg.bandmask, cfg.bands, sample_rate)));
        }
        if cfg.shift > 0 {
            steps.push(Box::new(Shift::new(cfg.shift, cfg.shift_same)));
        }
        if cfg.revecho > 0.0 {
            steps.push(Box::new(RevEcho::from_config(cfg, sample_rate)));
        }
        let pipeline = Self::new(steps, seed);
        tracing::info!("Augmentations: [{}]", pipeline.names().join(", "));
        pipeline
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Augment for AugmentPipeline {
    fn augment(&mut self, sources: Array3<f32>) -> Result<Array3<f32>> {
        let mut sources = sources;
        for step in &self.steps {
            sources = step.apply(sources, &mut self.rng)?;
        }
        Ok(sources)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp_sources(batch: usize, len: usize) -> Array3<f32> {
        Array3::from_shape_fn((2, batch, len), |(src, b, t)| {
            (src * 1000 + b * 100) as f32 + t as f32 * 0.01
        })
    }

    #[test]
    fn test_remix_permutes_noise_and_keeps_clean() {
        let sources = ramp_sources(6, 8);
        let mut rng = StdRng::seed_from_u64(3);
        let out = Remix.apply(sources.clone(), &mut rng).unwrap();

        assert_eq!(out.index_axis(Axis(0), 1), sources.index_axis(Axis(0), 1));
        let mut firsts: Vec<f32> = (0..6).map(|b| out[[0, b, 0]]).collect();
        firsts.sort_by(f32::total_cmp);
        assert_eq!(firsts, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
    }

    #[test]
    fn test_shift_shortens_and_keeps_sources_aligned() {
        let sources = ramp_sources(3, 50);
        let mut rng = StdRng::seed_from_u64(11);
        let out = Shift::new(10, true).apply(sources, &mut rng).unwrap();
        assert_eq!(out.dim(), (2, 3, 40));
        for b in 0..3 {
            // Both sources start at the same offset
            let noise_off = out[[0, b, 0]] - (b * 100) as f32;
            let clean_off = out[[1, b, 0]] - (1000 + b * 100) as f32;
            assert_abs_diff_eq!(noise_off, clean_off, epsilon = 1e-3);
            assert!(noise_off < 0.1 + 1e-4);
        }
    }

    #[test]
    fn test_shift_longer_than_batch_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Shift::new(8, true).apply(ramp_sources(1, 8), &mut rng).is_err());
    }

    #[test]
    fn test_bandmask_keeps_dc_and_shape() {
        let sources = Array3::from_elem((2, 2, 256), 0.5f32);
        let mut rng = StdRng::seed_from_u64(5);
        let out = BandMask::new(0.2, 120, 16_000).apply(sources, &mut rng).unwrap();
        assert_eq!(out.dim(), (2, 2, 256));
        for &v in out.iter() {
            assert_abs_diff_eq!(v, 0.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_bandmask_removes_a_tone_inside_the_band() {
        let len = 400;
        // Bin 40 of 400 at 16 kHz is 1600 Hz
        let tone = Array3::from_shape_fn((2, 1, len), |(_, _, t)| {
            (2.0 * std::f32::consts::PI * 40.0 * t as f32 / len as f32).sin()
        });
        let mut sources = tone.clone();
        BandMask::mask_rows(&mut sources, 1500.0 / 16_000.0, 1700.0 / 16_000.0).unwrap();
        for &v in sources.iter() {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-4);
        }
        let mut untouched = tone.clone();
        BandMask::mask_rows(&mut untouched, 2000.0 / 16_000.0, 3000.0 / 16_000.0).unwrap();
        for (a, b) in untouched.iter().zip(tone.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_revecho_with_zero_probability_is_identity() {
        let cfg = AugmentConfig { revecho: 0.0, ..AugmentConfig::default() };
        let sources = ramp_sources(2, 64);
        let mut rng = StdRng::seed_from_u64(1);
        let out = RevEcho::from_config(&cfg, 16_000).apply(sources.clone(), &mut rng).unwrap();
        assert_eq!(out, sources);
    }

    #[test]
    fn test_revecho_keep_clean_one_leaves_silent_noise_silent() {
        let cfg = AugmentConfig {
            revecho: 1.0,
            revecho_initial: 1.0,
            keep_clean: 1.0,
            ..AugmentConfig::default()
        };
        let mut sources = Array3::<f32>::zeros((2, 2, 2000));
        sources.slice_mut(s![1, .., 0]).fill(1.0);
        let mut rng = StdRng::seed_from_u64(2);
        let out = RevEcho::from_config(&cfg, 16_000).apply(sources, &mut rng).unwrap();

        assert!(out.index_axis(Axis(0), 0).iter().all(|&v| v == 0.0));
        // The impulse now has a tail
        let tail: f32 = out.slice(s![1, 0, 1..]).iter().map(|v| v.abs()).sum();
        assert!(tail > 0.0);
    }

    #[test]
    fn test_pipeline_order_and_identity_when_disabled() {
        let cfg = AugmentConfig {
            remix: true,
            bandmask: 0.2,
            shift: 4,
            revecho: 0.5,
            ..AugmentConfig::default()
        };
        let pipeline = AugmentPipeline::from_config(&cfg, 16_000, 0);
        assert_eq!(pipeline.names(), vec!["remix", "bandmask", "shift", "revecho"]);

        let off = AugmentConfig { bandmask: 0.0, shift: 0, ..AugmentConfig::default() };
        let mut pipeline = AugmentPipeline::from_config(&off, 16_000, 0);
        assert!(pipeline.is_empty());
        let sources = ramp_sources(2, 16);
        assert_eq!(pipeline.augment(sources.clone()).unwrap(), sources);
    }
}
