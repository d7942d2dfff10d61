//! Pipeline configuration.
//!
//! Loaded from a TOML file when one is given, otherwise built from defaults
//! that reproduce the classic ndmg registration settings. `FSLDIR` from the
//! environment fills in `tools.fsl_dir` when the file leaves it unset.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::error::{RegistrationError, Result};
use crate::gradients::DEFAULT_B0_THRESHOLD;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tools: ToolsConfig,
    pub align: AlignParams,
    pub apply: ApplyParams,
    pub gradients: GradientConfig,
    pub cleanup: CleanupPolicy,
    pub logging: LoggingConfig,
}

/// Names (or paths) of the FSL programs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// When set, programs are resolved as `<fsl_dir>/bin/<name>`.
    pub fsl_dir: Option<PathBuf>,
    pub flirt: String,
    pub mcflirt: String,
    pub eddy_correct: String,
    pub convert_xfm: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fsl_dir: None,
            flirt: "flirt".to_string(),
            mcflirt: "mcflirt".to_string(),
            eddy_correct: "eddy_correct".to_string(),
            convert_xfm: "convert_xfm".to_string(),
        }
    }
}

impl ToolsConfig {
    pub fn resolve(&self, name: &str) -> PathBuf {
        match &self.fsl_dir {
            Some(dir) => dir.join("bin").join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Cost functions understood by flirt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostFunction {
    MutualInfo,
    CorRatio,
    NormCorr,
    NormMi,
    LeastSq,
}

impl fmt::Display for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CostFunction::MutualInfo => "mutualinfo",
            CostFunction::CorRatio => "corratio",
            CostFunction::NormCorr => "normcorr",
            CostFunction::NormMi => "normmi",
            CostFunction::LeastSq => "leastsq",
        };
        write!(f, "{name}")
    }
}

/// Settings for computing a linear transform.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlignParams {
    pub cost: CostFunction,
    pub bins: u32,
    pub dof: u32,
    /// Rotational search range in degrees, used for all three axes.
    pub search_range: [f64; 2],
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            cost: CostFunction::MutualInfo,
            bins: 256,
            dof: 12,
            search_range: [-180.0, 180.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Trilinear,
    NearestNeighbour,
    Sinc,
    Spline,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interpolation::Trilinear => "trilinear",
            Interpolation::NearestNeighbour => "nearestneighbour",
            Interpolation::Sinc => "sinc",
            Interpolation::Spline => "spline",
        };
        write!(f, "{name}")
    }
}

/// Settings for applying an existing transform.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplyParams {
    pub interp: Interpolation,
}

impl Default for ApplyParams {
    fn default() -> Self {
        Self {
            interp: Interpolation::Trilinear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GradientConfig {
    pub b0_threshold: f64,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            b0_threshold: DEFAULT_B0_THRESHOLD,
        }
    }
}

/// What happens to `<work_dir>/tmp/` intermediates when `mri2atlas` ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Remove after success, keep after a failure for diagnosis.
    #[default]
    OnSuccess,
    /// Remove after success, best-effort removal after a failure.
    Always,
    /// Never remove.
    Never,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from a TOML file, or defaults when `path` is `None`.
///
/// # Errors
///
/// Returns an error if the file is missing, is not valid TOML or fails
/// validation.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|e| {
                RegistrationError::config(format!("cannot read {}: {e}", path.display()))
            })?;
            parse_config(&content)?
        }
        None => PipelineConfig::default(),
    };
    apply_environment_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    toml::from_str(content).map_err(|e| RegistrationError::config(e.to_string()))
}

fn apply_environment_overrides(config: &mut PipelineConfig) {
    if config.tools.fsl_dir.is_none() {
        if let Ok(dir) = env::var("FSLDIR") {
            if !dir.is_empty() {
                config.tools.fsl_dir = Some(PathBuf::from(dir));
            }
        }
    }
}

pub fn validate(config: &PipelineConfig) -> Result<()> {
    let align = &config.align;
    if align.bins == 0 {
        return Err(RegistrationError::config("align.bins must be positive"));
    }
    if ![6, 7, 9, 12].contains(&align.dof) {
        return Err(RegistrationError::config(format!(
            "align.dof must be 6, 7, 9 or 12, got {}",
            align.dof
        )));
    }
    if align.search_range[0] >= align.search_range[1] {
        return Err(RegistrationError::config(format!(
            "align.search_range low ({}) must be below high ({})",
            align.search_range[0], align.search_range[1]
        )));
    }
    if config.gradients.b0_threshold < 0.0 {
        return Err(RegistrationError::config(
            "gradients.b0_threshold must not be negative",
        ));
    }
    if let Err(e) = EnvFilter::try_new(&config.logging.level) {
        return Err(RegistrationError::config(format!(
            "logging.level `{}` is not a valid filter: {e}",
            config.logging.level
        )));
    }
    let tools = &config.tools;
    for (key, name) in [
        ("flirt", &tools.flirt),
        ("mcflirt", &tools.mcflirt),
        ("eddy_correct", &tools.eddy_correct),
        ("convert_xfm", &tools.convert_xfm),
    ] {
        if name.trim().is_empty() {
            return Err(RegistrationError::config(format!("tools.{key} is empty")));
        }
    }
    Ok(())
}
