//! Error types for the registration pipeline.
//!
//! Every variant is unrecoverable at the orchestration layer: the pipeline
//! stops at the first error and leaves its intermediates on disk.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// An external program exited non-zero or could not be started.
    #[error("external tool `{tool}` failed ({}): {stderr}", describe_status(.status))]
    ExternalTool {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A path does not hold a usable NIfTI volume.
    #[error("invalid volume {}: {reason}", .path.display())]
    InvalidVolume { path: PathBuf, reason: String },

    /// A file expected by (or from) a pipeline step is absent.
    #[error("missing artifact {} at step `{step}`", .path.display())]
    MissingArtifact { path: PathBuf, step: String },

    /// A transform file does not hold a 4x4 matrix.
    #[error("invalid transform {}: {reason}", .path.display())]
    InvalidTransform { path: PathBuf, reason: String },

    #[error("invalid gradient table: {0}")]
    InvalidGradientTable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "not started or killed by signal".to_string(),
    }
}

impl RegistrationError {
    pub fn invalid_volume(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidVolume {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_artifact(path: impl Into<PathBuf>, step: impl Into<String>) -> Self {
        Self::MissingArtifact {
            path: path.into(),
            step: step.into(),
        }
    }

    pub fn invalid_transform(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidTransform {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn gradient_table(msg: impl Into<String>) -> Self {
        Self::InvalidGradientTable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
