// ============================================================
// Layer 3 - Architecture Choices
// ============================================================
// Which network the experiment builds. Parsed from short tags
// on the command line and persisted with the experiment config.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// The model family to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Learnable scattering front-end followed by a trainable head
    Scattering,
    /// Patch-based vision transformer
    Vit,
    /// Plain strided CNN
    Cnn,
}

impl std::str::FromStr for Architecture {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sn" | "scattering"   => Ok(Architecture::Scattering),
            "maxvit" | "vit"      => Ok(Architecture::Vit),
            "cnn" | "o3"          => Ok(Architecture::Cnn),
            other => bail!("unknown architecture '{other}': expected sn, maxvit or cnn"),
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Architecture::Scattering => "sn",
            Architecture::Vit        => "maxvit",
            Architecture::Cnn        => "cnn",
        })
    }
}

/// Trainable head placed on top of the scattering coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadKind {
    Cnn,
    Mlp,
    Linear,
}

impl std::str::FromStr for HeadKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cnn"    => Ok(HeadKind::Cnn),
            "mlp"    => Ok(HeadKind::Mlp),
            "linear" => Ok(HeadKind::Linear),
            other => bail!("unknown head '{other}': expected cnn, mlp or linear"),
        }
    }
}

impl std::fmt::Display for HeadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HeadKind::Cnn    => "cnn",
            HeadKind::Mlp    => "mlp",
            HeadKind::Linear => "linear",
        })
    }
}

/// Backend the run executes on. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    Wgpu,
    Cpu,
}

impl std::str::FromStr for Accelerator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" | "gpu" => Ok(Accelerator::Wgpu),
            "cpu" | "ndarray" => Ok(Accelerator::Cpu),
            other => bail!("unknown accelerator '{other}': expected wgpu or cpu"),
        }
    }
}
