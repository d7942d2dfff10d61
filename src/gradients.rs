//! Diffusion gradient table.
//!
//! Only used to decide which frames of a DTI stack are B0 (non
//! diffusion-weighted) frames; the first of them is the alignment reference.

use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RegistrationError, Result};
use crate::naming::stem;

/// b-values at or below this count as B0 frames.
pub const DEFAULT_B0_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GradientTable {
    bvals: Vec<f64>,
    bvecs: Option<Vec<[f64; 3]>>,
    b0_threshold: f64,
}

impl GradientTable {
    pub fn new(bvals: Vec<f64>, b0_threshold: f64) -> Self {
        Self {
            bvals,
            bvecs: None,
            b0_threshold,
        }
    }

    pub fn with_bvecs(mut self, bvecs: Vec<[f64; 3]>) -> Result<Self> {
        if bvecs.len() != self.bvals.len() {
            return Err(RegistrationError::gradient_table(format!(
                "{} b-values but {} b-vectors",
                self.bvals.len(),
                bvecs.len()
            )));
        }
        self.bvecs = Some(bvecs);
        Ok(self)
    }

    /// Reads FSL-style `.bval` and (optionally) `.bvec` text files.
    pub fn from_files(bvals: &Path, bvecs: Option<&Path>, b0_threshold: f64) -> Result<Self> {
        let values = read_numbers(bvals)?;
        if values.is_empty() {
            return Err(RegistrationError::gradient_table(format!(
                "no b-values in {}",
                bvals.display()
            )));
        }
        let table = GradientTable::new(values, b0_threshold);
        match bvecs {
            Some(path) => {
                let vectors = read_bvecs(path, table.len())?;
                table.with_bvecs(vectors)
            }
            None => Ok(table),
        }
    }

    /// Finds `<stem>*.bval` and `<stem>*.bvec` next to a DWI file.
    pub fn discover(dwi: &Path) -> Result<(PathBuf, Option<PathBuf>)> {
        let dir = dwi.parent().unwrap_or_else(|| Path::new("."));
        let base = stem(dwi);

        let bval = companions(dir, &base, "bval")?;
        let bval = match bval.as_slice() {
            [one] => one.clone(),
            [] => {
                return Err(RegistrationError::gradient_table(format!(
                    "no {base}*.bval next to {}",
                    dwi.display()
                )))
            }
            many => {
                return Err(RegistrationError::gradient_table(format!(
                    "{} candidate .bval files for {}",
                    many.len(),
                    dwi.display()
                )))
            }
        };
        let bvec = companions(dir, &base, "bvec")?.into_iter().next();
        Ok((bval, bvec))
    }

    pub fn len(&self) -> usize {
        self.bvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bvals.is_empty()
    }

    pub fn bvals(&self) -> &[f64] {
        &self.bvals
    }

    pub fn bvecs(&self) -> Option<&[[f64; 3]]> {
        self.bvecs.as_deref()
    }

    pub fn b0s_mask(&self) -> Vec<bool> {
        self.bvals.iter().map(|b| *b <= self.b0_threshold).collect()
    }

    pub fn b0_indices(&self) -> Vec<usize> {
        self.b0s_mask()
            .into_iter()
            .enumerate()
            .filter_map(|(i, is_b0)| is_b0.then_some(i))
            .collect()
    }

    /// Index of the first B0 frame.
    pub fn first_b0(&self) -> Result<usize> {
        self.b0_indices().first().copied().ok_or_else(|| {
            RegistrationError::gradient_table(format!(
                "no frame with b-value <= {}",
                self.b0_threshold
            ))
        })
    }
}

fn companions(dir: &Path, base: &str, ext: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(base),
        ext
    );
    let mut paths: Vec<PathBuf> = glob(&pattern)
        .map_err(|e| RegistrationError::gradient_table(e.to_string()))?
        .filter_map(std::result::Result::ok)
        .collect();
    paths.sort();
    Ok(paths)
}

fn read_numbers(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path)?;
    text.split_whitespace()
        .map(|v| {
            v.parse::<f64>().map_err(|e| {
                RegistrationError::gradient_table(format!("{}: `{v}`: {e}", path.display()))
            })
        })
        .collect()
}

// bvec files are 3 rows of N columns (FSL) or N rows of 3
fn read_bvecs(path: &Path, n: usize) -> Result<Vec<[f64; 3]>> {
    let text = fs::read_to_string(path)?;
    let rows: Vec<Vec<f64>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            l.split_whitespace()
                .map(|v| {
                    v.parse::<f64>().map_err(|e| {
                        RegistrationError::gradient_table(format!("{}: `{v}`: {e}", path.display()))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<_>>()?;

    if rows.len() == 3 && rows.iter().all(|r| r.len() == n) {
        Ok((0..n).map(|i| [rows[0][i], rows[1][i], rows[2][i]]).collect())
    } else if rows.len() == n && rows.iter().all(|r| r.len() == 3) {
        Ok(rows.iter().map(|r| [r[0], r[1], r[2]]).collect())
    } else {
        Err(RegistrationError::gradient_table(format!(
            "{} is neither 3x{n} nor {n}x3",
            path.display()
        )))
    }
}
