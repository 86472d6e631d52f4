// ============================================================
// Layer 6 — Sample Writer
// ============================================================
// The default SampleEnhancer. Runs the model over every noisy
// clip of the test set and writes, per clip `<stem>.wav`:
//
//   <out_dir>/<stem>_noisy.wav
//   <out_dir>/<stem>_enhanced.wav
//
// Files are mono 32-bit float WAV at the run's sample rate and
// are overwritten at every evaluation epoch.

use anyhow::{anyhow, Context, Result};
use burn::{prelude::*, tensor::TensorData};
use std::{fs, path::Path};

use crate::data::loader::{write_mono, ClipPair};
use crate::domain::traits::SampleEnhancer;
use crate::ml::contracts::EnhancementModel;

pub struct WavSampleWriter<B: Backend> {
    clips:       Vec<ClipPair>,
    sample_rate: u32,
    device:      B::Device,
}

impl<B: Backend> WavSampleWriter<B> {
    pub fn new(clips: Vec<ClipPair>, sample_rate: u32, device: B::Device) -> Self {
        Self { clips, sample_rate, device }
    }
}

impl<B: Backend, M: EnhancementModel<B>> SampleEnhancer<M> for WavSampleWriter<B> {
    fn enhance(&mut self, model: &M, out_dir: &Path) -> Result<()> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Cannot create samples directory '{}'", out_dir.display()))?;

        for clip in &self.clips {
            let samples = clip.noisy.len();
            let noisy = Tensor::<B, 2>::from_data(
                TensorData::new(clip.noisy.clone(), [1, samples]),
                &self.device,
            );
            let enhanced = model
                .forward(noisy)
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("Cannot read enhanced '{}': {:?}", clip.name, e))?;

            let stem = Path::new(&clip.name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(clip.name.as_str());
            write_mono(&out_dir.join(format!("{stem}_noisy.wav")), &clip.noisy, self.sample_rate)?;
            write_mono(&out_dir.join(format!("{stem}_enhanced.wav")), &enhanced, self.sample_rate)?;
        }

        tracing::info!("Wrote {} enhanced samples to '{}'", self.clips.len(), out_dir.display());
        Ok(())
    }
}
