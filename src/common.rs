use crate::error::{RegistrationError, Result};
use std::fmt;
use std::str::FromStr;

// set up enums and structs
/// Acquisition type of a 4D stack, selects the slice-alignment tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    /// fMRI, corrected with motion correction
    Functional,
    /// DTI, corrected with per-slice eddy-current correction
    Diffusion,
}

impl Modality {
    pub fn from_flag(val: &str) -> Result<Self> {
        match val {
            "f" | "functional" | "fmri" => Ok(Modality::Functional),
            "d" | "diffusion" | "dti" | "dwi" => Ok(Modality::Diffusion),
            other => Err(RegistrationError::config(format!(
                "unknown modality `{other}` (expected `f` or `d`)"
            ))),
        }
    }
}

impl FromStr for Modality {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        Modality::from_flag(&s.to_ascii_lowercase())
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Functional => write!(f, "functional"),
            Modality::Diffusion => write!(f, "diffusion"),
        }
    }
}

/// Steps of `mri2atlas`, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SliceAlign,
    ExtractRefFrame,
    AlignToStructural,
    AlignStructuralToAtlas,
    ComposeTransforms,
    ApplyComposed,
    ResampleFinal,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::SliceAlign,
        Stage::ExtractRefFrame,
        Stage::AlignToStructural,
        Stage::AlignStructuralToAtlas,
        Stage::ComposeTransforms,
        Stage::ApplyComposed,
        Stage::ResampleFinal,
        Stage::Cleanup,
    ];

    pub fn to_usize(&self) -> usize {
        match self {
            Stage::SliceAlign => 0,
            Stage::ExtractRefFrame => 1,
            Stage::AlignToStructural => 2,
            Stage::AlignStructuralToAtlas => 3,
            Stage::ComposeTransforms => 4,
            Stage::ApplyComposed => 5,
            Stage::ResampleFinal => 6,
            Stage::Cleanup => 7,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SliceAlign => "slice-align",
            Stage::ExtractRefFrame => "extract-ref-frame",
            Stage::AlignToStructural => "align-to-structural",
            Stage::AlignStructuralToAtlas => "align-structural-to-atlas",
            Stage::ComposeTransforms => "compose-transforms",
            Stage::ApplyComposed => "apply-composed",
            Stage::ResampleFinal => "resample-final",
            Stage::Cleanup => "cleanup",
        };
        write!(f, "{name}")
    }
}
