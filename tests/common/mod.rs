//! Shared helpers for integration tests: synthetic volumes and an in-memory
//! registration backend that records calls instead of running FSL.

#![allow(dead_code)]

use atlasreg::config::{AlignParams, ApplyParams};
use atlasreg::resample::resample_like;
use atlasreg::{Affine, Modality, RegistrationBackend, RegistrationError, Result, Volume};
use nalgebra::Matrix4;
use ndarray::{ArrayD, Dimension, IxDyn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ComputeAffine {
        input: PathBuf,
        reference: PathBuf,
        transform: PathBuf,
    },
    ApplyAffine {
        input: PathBuf,
        reference: PathBuf,
        transform: PathBuf,
        output: PathBuf,
    },
    CorrectStack {
        stack: PathBuf,
        corrected: PathBuf,
        ref_index: usize,
        modality: Modality,
    },
    ComposeAffine {
        first: PathBuf,
        second: PathBuf,
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Compute,
    Apply,
    Correct,
    Compose,
}

/// Backend double: correction copies the stack, apply re-grids onto the
/// reference, compute writes queued matrices (identity when the queue is
/// empty) and compose multiplies the two input matrices.
#[derive(Default)]
pub struct StubBackend {
    pub calls: RefCell<Vec<Call>>,
    affines: RefCell<VecDeque<Affine>>,
    failures: Vec<(Op, PathBuf)>,
    no_ops: Vec<Op>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` exit non-zero when its first path argument is `input`.
    pub fn failing(mut self, op: Op, input: &Path) -> Self {
        self.failures.push((op, input.to_path_buf()));
        self
    }

    /// Make `op` report success without writing its output.
    pub fn silent(mut self, op: Op) -> Self {
        self.no_ops.push(op);
        self
    }

    pub fn queue_affine(self, affine: Affine) -> Self {
        self.affines.borrow_mut().push_back(affine);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn check(&self, op: Op, input: &Path) -> Result<bool> {
        if self.failures.iter().any(|(o, p)| *o == op && p == input) {
            return Err(RegistrationError::ExternalTool {
                tool: format!("stub-{op:?}").to_lowercase(),
                status: Some(1),
                stderr: "forced failure".to_string(),
            });
        }
        Ok(!self.no_ops.contains(&op))
    }
}

impl RegistrationBackend for StubBackend {
    fn compute_affine(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        _params: &AlignParams,
    ) -> Result<()> {
        self.calls.borrow_mut().push(Call::ComputeAffine {
            input: input.to_path_buf(),
            reference: reference.to_path_buf(),
            transform: transform.to_path_buf(),
        });
        if self.check(Op::Compute, input)? {
            let affine = self
                .affines
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(Affine::identity);
            affine.write_mat(transform)?;
        }
        Ok(())
    }

    fn apply_affine(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        output: &Path,
        _params: &ApplyParams,
    ) -> Result<()> {
        self.calls.borrow_mut().push(Call::ApplyAffine {
            input: input.to_path_buf(),
            reference: reference.to_path_buf(),
            transform: transform.to_path_buf(),
            output: output.to_path_buf(),
        });
        if self.check(Op::Apply, input)? {
            let moving = Volume::load(input)?;
            let target = Volume::load(reference)?;
            resample_like(&moving, input, &target)?.save(output)?;
        }
        Ok(())
    }

    fn correct_stack(
        &self,
        stack: &Path,
        corrected: &Path,
        ref_index: usize,
        modality: Modality,
    ) -> Result<()> {
        self.calls.borrow_mut().push(Call::CorrectStack {
            stack: stack.to_path_buf(),
            corrected: corrected.to_path_buf(),
            ref_index,
            modality,
        });
        if self.check(Op::Correct, stack)? {
            fs::copy(stack, corrected)?;
        }
        Ok(())
    }

    fn compose_affine(&self, first: &Path, second: &Path, output: &Path) -> Result<()> {
        self.calls.borrow_mut().push(Call::ComposeAffine {
            first: first.to_path_buf(),
            second: second.to_path_buf(),
            output: output.to_path_buf(),
        });
        if self.check(Op::Compose, first)? {
            let a = Affine::read_mat(first)?;
            let b = Affine::read_mat(second)?;
            a.then(&b).write_mat(output)?;
        }
        Ok(())
    }
}

pub fn scaled_affine(spacing: f64, origin: f64) -> Matrix4<f64> {
    let mut affine = Matrix4::identity();
    for axis in 0..3 {
        affine[(axis, axis)] = spacing;
        affine[(axis, 3)] = origin;
    }
    affine
}

/// Writes a volume whose voxel values encode their index.
pub fn write_volume(path: &Path, shape: &[usize], affine: &Matrix4<f64>) -> PathBuf {
    let data = ArrayD::from_shape_fn(IxDyn(shape), |idx| {
        idx.slice()
            .iter()
            .enumerate()
            .map(|(axis, i)| (*i as f32) * 10f32.powi(axis as i32))
            .sum::<f32>()
            + 1.0
    });
    Volume::new(data, affine).save(path).unwrap();
    path.to_path_buf()
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
