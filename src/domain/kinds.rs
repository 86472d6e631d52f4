// ============================================================
// Layer 3 — Option Selectors
// ============================================================
// The string-valued options of a training run, parsed once into
// closed enums. Unknown strings become a ConfigError at parse
// time so nothing downstream ever sees an unrecognised value.
//
// Every enum here:
//   - parses with FromStr (used by clap and by tests)
//   - prints with Display using the same spelling
//   - (de)serialises with serde using the same spelling

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::domain::error::ConfigError;

// ─── EnhancementLossKind ──────────────────────────────────────────────────────
/// Base waveform-domain loss between clean and estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementLossKind {
    /// Mean absolute error
    L1,
    /// Mean squared error
    L2,
    /// Smooth L1 with threshold 1.0
    Huber,
}

impl FromStr for EnhancementLossKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l1"    => Ok(Self::L1),
            "l2"    => Ok(Self::L2),
            "huber" => Ok(Self::Huber),
            other   => Err(ConfigError::UnknownEnhancementLoss(other.to_string())),
        }
    }
}

impl fmt::Display for EnhancementLossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L1    => "l1",
            Self::L2    => "l2",
            Self::Huber => "huber",
        })
    }
}

// ─── AcousticLossKind ─────────────────────────────────────────────────────────
/// Distance used in the acoustic-parameter embedding space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcousticLossKind {
    L2,
    L1,
    /// Squared error weighted per frame by `sqrt(sigmoid(energy))`
    FrameEnergyWeightedL2,
    /// Absolute error weighted per frame by `sigmoid(energy)`
    FrameEnergyWeightedL1,
}

impl FromStr for AcousticLossKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2"                       => Ok(Self::L2),
            "l1"                       => Ok(Self::L1),
            "frame_energy_weighted_l2" => Ok(Self::FrameEnergyWeightedL2),
            "frame_energy_weighted_l1" => Ok(Self::FrameEnergyWeightedL1),
            other => Err(ConfigError::UnknownAcousticLoss(other.to_string())),
        }
    }
}

impl fmt::Display for AcousticLossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L2                    => "l2",
            Self::L1                    => "l1",
            Self::FrameEnergyWeightedL2 => "frame_energy_weighted_l2",
            Self::FrameEnergyWeightedL1 => "frame_energy_weighted_l1",
        })
    }
}

// ─── Mode ─────────────────────────────────────────────────────────────────────
/// Whether a forward pass belongs to training or evaluation.
/// Forwarded to the acoustic estimator, which decides what
/// changes between the two (dropout and the like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Eval,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "eval"  => Ok(Self::Eval),
            other   => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "train",
            Self::Eval  => "eval",
        })
    }
}

// ─── OptimizerKind ────────────────────────────────────────────────────────────
/// Stored in every checkpoint so a resumed run only restores
/// optimizer moments produced by the same algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adam" => Ok(Self::Adam),
            "sgd"  => Ok(Self::Sgd),
            other  => Err(ConfigError::UnknownOptimizer(other.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Adam => "adam",
            Self::Sgd  => "sgd",
        })
    }
}

// ─── DeviceKind ───────────────────────────────────────────────────────────────
/// `cpu` runs on the NdArray backend, `gpu` on Wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl FromStr for DeviceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu"          => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            other          => Err(ConfigError::UnknownDevice(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhancement_kinds_parse() {
        assert_eq!("l1".parse::<EnhancementLossKind>().unwrap(), EnhancementLossKind::L1);
        assert_eq!("huber".parse::<EnhancementLossKind>().unwrap(), EnhancementLossKind::Huber);
        assert!(matches!(
            "l3".parse::<EnhancementLossKind>(),
            Err(ConfigError::UnknownEnhancementLoss(s)) if s == "l3"
        ));
    }

    #[test]
    fn test_acoustic_kinds_round_trip_through_display() {
        for kind in [
            AcousticLossKind::L2,
            AcousticLossKind::L1,
            AcousticLossKind::FrameEnergyWeightedL2,
            AcousticLossKind::FrameEnergyWeightedL1,
        ] {
            assert_eq!(kind.to_string().parse::<AcousticLossKind>().unwrap(), kind);
        }
        assert!("cosine".parse::<AcousticLossKind>().is_err());
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        assert_eq!("eval".parse::<Mode>().unwrap(), Mode::Eval);
        assert!(matches!("test".parse::<Mode>(), Err(ConfigError::InvalidMode(_))));
    }

    #[test]
    fn test_serde_spelling_matches_display() {
        let json = serde_json::to_string(&AcousticLossKind::FrameEnergyWeightedL1).unwrap();
        assert_eq!(json, "\"frame_energy_weighted_l1\"");
        let kind: OptimizerKind = serde_json::from_str("\"sgd\"").unwrap();
        assert_eq!(kind, OptimizerKind::Sgd);
    }
}
