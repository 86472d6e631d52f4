// ============================================================
// Layer 4 — WAV Pair Loader
// ============================================================
// Loads paired noisy/clean recordings from a directory laid out
// as:
//
//   <dir>/
//     noisy/  p232_001.wav  p232_002.wav ...
//     clean/  p232_001.wav  p232_002.wav ...
//
// Files are matched by name. Every noisy file needs a clean
// counterpart with the same sample rate and length; anything
// else is a data error and aborts loading.
//
// Multi-channel files are downmixed to mono by averaging.
// Integer PCM is scaled to [-1, 1).

use anyhow::{bail, ensure, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// One noisy/clean recording pair, mono, same length.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPair {
    /// File name shared by both recordings
    pub name:  String,
    pub noisy: Vec<f32>,
    pub clean: Vec<f32>,
}

/// Reads every pair under a dataset directory.
pub struct WavPairLoader {
    dir:         PathBuf,
    sample_rate: u32,
}

impl WavPairLoader {
    pub fn new(dir: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self { dir: dir.into(), sample_rate }
    }

    /// Load all pairs, sorted by file name.
    pub fn load_all(&self) -> Result<Vec<ClipPair>> {
        let noisy_dir = self.dir.join("noisy");
        let clean_dir = self.dir.join("clean");

        let names = list_wavs(&noisy_dir)?;
        ensure!(
            !names.is_empty(),
            "no .wav files found in '{}'",
            noisy_dir.display()
        );

        let mut pairs = Vec::with_capacity(names.len());
        for name in names {
            let noisy = read_mono(&noisy_dir.join(&name), self.sample_rate)?;
            let clean_path = clean_dir.join(&name);
            if !clean_path.exists() {
                bail!("'{}' has no clean counterpart in '{}'", name, clean_dir.display());
            }
            let clean = read_mono(&clean_path, self.sample_rate)?;
            ensure!(
                noisy.len() == clean.len(),
                "'{}': noisy has {} samples, clean has {}",
                name,
                noisy.len(),
                clean.len()
            );
            tracing::debug!("Loaded pair '{}' ({} samples)", name, noisy.len());
            pairs.push(ClipPair { name, noisy, clean });
        }

        tracing::info!(
            "Loaded {} pairs from '{}'",
            pairs.len(),
            self.dir.display()
        );
        Ok(pairs)
    }
}

/// Sorted `.wav` file names in `dir`.
fn list_wavs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if is_wav {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Decode a WAV file into mono f32 samples at the expected rate.
pub fn read_mono(path: &Path, expected_rate: u32) -> Result<Vec<f32>> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;
    let spec = reader.spec();
    ensure!(
        spec.sample_rate == expected_rate,
        "'{}' is sampled at {} Hz, expected {} Hz",
        path.display(),
        spec.sample_rate,
        expected_rate
    );

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Corrupt samples in '{}'", path.display()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Corrupt samples in '{}'", path.display()))?
        }
    };

    let channels = spec.channels.max(1) as usize;
    if channels == 1 {
        return Ok(interleaved);
    }
    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

/// Write mono f32 samples as a 32-bit float WAV file.
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer
        .finalize()
        .with_context(|| format!("Cannot finish '{}'", path.display()))?;
    Ok(())
}
