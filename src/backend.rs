//! External registration tools.
//!
//! The orchestrator only talks to a [`RegistrationBackend`]. [`FslBackend`]
//! runs the FSL programs as subprocesses with structured argument lists;
//! tests substitute in-memory doubles.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::common::Modality;
use crate::config::{AlignParams, ApplyParams, ToolsConfig};
use crate::error::{RegistrationError, Result};

/// Capabilities the pipeline needs from a registration toolkit.
///
/// Each call blocks until its output file is written or an error occurs.
pub trait RegistrationBackend {
    /// Computes the linear transform taking `input` into `reference` space.
    fn compute_affine(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        params: &AlignParams,
    ) -> Result<()>;

    /// Resamples `input` onto `reference`'s grid through `transform`.
    fn apply_affine(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        output: &Path,
        params: &ApplyParams,
    ) -> Result<()>;

    /// Aligns every frame of a 4D stack to frame `ref_index`.
    fn correct_stack(
        &self,
        stack: &Path,
        corrected: &Path,
        ref_index: usize,
        modality: Modality,
    ) -> Result<()>;

    /// Writes the transform equivalent to applying `first`, then `second`.
    fn compose_affine(&self, first: &Path, second: &Path, output: &Path) -> Result<()>;
}

/// A program plus its argument list, run without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Program file name, used to label errors.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Runs to completion; a spawn failure or non-zero exit becomes
    /// `ExternalTool` carrying the captured stderr.
    pub fn run(&self) -> Result<()> {
        info!("Executing: {}", self);
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| RegistrationError::ExternalTool {
                tool: self.tool_name(),
                status: None,
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{} stdout: {}", self.tool_name(), stdout.trim());
        }
        if !output.status.success() {
            return Err(RegistrationError::ExternalTool {
                tool: self.tool_name(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// FSL command lines (flirt, mcflirt, eddy_correct, convert_xfm).
#[derive(Debug, Clone, Default)]
pub struct FslBackend {
    tools: ToolsConfig,
}

impl FslBackend {
    pub fn new(tools: ToolsConfig) -> Self {
        Self { tools }
    }

    pub fn flirt_align(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        params: &AlignParams,
    ) -> ToolInvocation {
        let [low, high] = params.search_range.map(|v| v.to_string());
        ToolInvocation::new(self.tools.resolve(&self.tools.flirt))
            .arg("-in")
            .arg(input)
            .arg("-ref")
            .arg(reference)
            .arg("-omat")
            .arg(transform)
            .arg("-cost")
            .arg(params.cost.to_string())
            .arg("-bins")
            .arg(params.bins.to_string())
            .arg("-dof")
            .arg(params.dof.to_string())
            .args(["-searchrx", low.as_str(), high.as_str()])
            .args(["-searchry", low.as_str(), high.as_str()])
            .args(["-searchrz", low.as_str(), high.as_str()])
    }

    pub fn flirt_apply(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        output: &Path,
        params: &ApplyParams,
    ) -> ToolInvocation {
        ToolInvocation::new(self.tools.resolve(&self.tools.flirt))
            .arg("-in")
            .arg(input)
            .arg("-ref")
            .arg(reference)
            .arg("-out")
            .arg(output)
            .arg("-init")
            .arg(transform)
            .arg("-interp")
            .arg(params.interp.to_string())
            .arg("-applyxfm")
    }

    pub fn stack_correction(
        &self,
        stack: &Path,
        corrected: &Path,
        ref_index: usize,
        modality: Modality,
    ) -> ToolInvocation {
        match modality {
            Modality::Functional => ToolInvocation::new(self.tools.resolve(&self.tools.mcflirt))
                .arg("-in")
                .arg(stack)
                .arg("-out")
                .arg(corrected)
                .arg("-plots")
                .arg("-refvol")
                .arg(ref_index.to_string()),
            Modality::Diffusion => {
                ToolInvocation::new(self.tools.resolve(&self.tools.eddy_correct))
                    .arg(stack)
                    .arg(corrected)
                    .arg(ref_index.to_string())
            }
        }
    }

    /// `convert_xfm -omat out -concat second first` (second applied after first)
    pub fn concat(&self, first: &Path, second: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new(self.tools.resolve(&self.tools.convert_xfm))
            .arg("-omat")
            .arg(output)
            .arg("-concat")
            .arg(second)
            .arg(first)
    }
}

impl RegistrationBackend for FslBackend {
    fn compute_affine(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        params: &AlignParams,
    ) -> Result<()> {
        self.flirt_align(input, reference, transform, params).run()
    }

    fn apply_affine(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        output: &Path,
        params: &ApplyParams,
    ) -> Result<()> {
        self.flirt_apply(input, reference, transform, output, params)
            .run()
    }

    fn correct_stack(
        &self,
        stack: &Path,
        corrected: &Path,
        ref_index: usize,
        modality: Modality,
    ) -> Result<()> {
        self.stack_correction(stack, corrected, ref_index, modality)
            .run()
    }

    fn compose_affine(&self, first: &Path, second: &Path, output: &Path) -> Result<()> {
        self.concat(first, second, output).run()
    }
}
