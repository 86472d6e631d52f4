// ============================================================
// Layer 5 — Baseline Networks
// ============================================================
// Small reference implementations of the two model contracts so
// the CLI and the tests have something concrete to train:
//
//   ConvDenoiser   — two 1-D convolutions with a residual path
//   FrameEstimator — per-frame MLP from an STFT frame to P
//                    acoustic parameters
//
// Any other Burn module implementing the contracts can replace
// them.

use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig1d, Relu,
    },
    prelude::*,
};

use crate::domain::kinds::Mode;
use crate::ml::contracts::{AcousticEstimator, EnhancementModel, ModelDescriptor};

// ─── ConvDenoiser ─────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ConvDenoiserConfig {
    #[config(default = 16)]
    pub channels: usize,
    /// Odd, so the output keeps the input length
    #[config(default = 9)]
    pub kernel:   usize,
}

impl ConvDenoiserConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvDenoiser<B> {
        let pad = PaddingConfig1d::Explicit(self.kernel / 2);
        let encode = Conv1dConfig::new(1, self.channels, self.kernel)
            .with_padding(pad.clone())
            .init(device);
        let decode = Conv1dConfig::new(self.channels, 1, self.kernel)
            .with_padding(pad)
            .init(device);
        ConvDenoiser {
            encode,
            decode,
            activation: Relu::new(),
            channels:   self.channels,
            kernel:     self.kernel,
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvDenoiser<B: Backend> {
    pub encode:     Conv1d<B>,
    pub decode:     Conv1d<B>,
    pub activation: Relu,
    pub channels:   usize,
    pub kernel:     usize,
}

impl<B: Backend> EnhancementModel<B> for ConvDenoiser<B> {
    fn forward(&self, noisy: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, samples] = noisy.dims();
        let x = noisy.clone().reshape([batch, 1, samples]);
        let hidden = self.activation.forward(self.encode.forward(x));
        let correction = self.decode.forward(hidden).reshape([batch, samples]);
        noisy + correction
    }

    fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            name:   "conv_denoiser".to_string(),
            config: serde_json::json!({ "channels": self.channels, "kernel": self.kernel }),
        }
    }
}

// ─── FrameEstimator ───────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct FrameEstimatorConfig {
    /// Interleaved re/im STFT bins per frame
    #[config(default = 514)]
    pub input:   usize,
    #[config(default = 256)]
    pub hidden:  usize,
    /// Number of acoustic parameters per frame
    #[config(default = 25)]
    pub outputs: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl FrameEstimatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FrameEstimator<B> {
        FrameEstimator {
            input:      LinearConfig::new(self.input, self.hidden).init(device),
            output:     LinearConfig::new(self.hidden, self.outputs).init(device),
            activation: Relu::new(),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct FrameEstimator<B: Backend> {
    pub input:      Linear<B>,
    pub output:     Linear<B>,
    pub activation: Relu,
    pub dropout:    Dropout,
}

impl<B: Backend> AcousticEstimator<B> for FrameEstimator<B> {
    fn forward(&self, spectrum: Tensor<B, 3>, mode: Mode) -> Tensor<B, 3> {
        let hidden = self.activation.forward(self.input.forward(spectrum));
        let hidden = match mode {
            Mode::Train => self.dropout.forward(hidden),
            Mode::Eval  => hidden,
        };
        self.output.forward(hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_denoiser_keeps_shape_and_describes_itself() {
        let device = Default::default();
        let model = ConvDenoiserConfig::new().with_channels(4).init::<TestBackend>(&device);
        let out = model.forward(Tensor::zeros([3, 100], &device));
        assert_eq!(out.dims(), [3, 100]);
        let desc = model.descriptor();
        assert_eq!(desc.name, "conv_denoiser");
        assert_eq!(desc.config["channels"], 4);
    }

    #[test]
    fn test_estimator_is_deterministic_in_eval() {
        let device = Default::default();
        let est = FrameEstimatorConfig::new()
            .with_input(10)
            .with_hidden(8)
            .with_outputs(3)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::ones([2, 5, 10], &device);
        let a = est.forward(x.clone(), Mode::Eval);
        let b = est.forward(x, Mode::Eval);
        assert_eq!(a.dims(), [2, 5, 3]);
        assert_eq!(a.into_data(), b.into_data());
    }
}
