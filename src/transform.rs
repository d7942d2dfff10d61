//! 4x4 affine transforms stored as FSL `.mat` text files.

use nalgebra::{Matrix4, Point3};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{RegistrationError, Result};

/// Affine mapping from one volume's space to another's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub Matrix4<f64>);

impl Affine {
    pub fn identity() -> Self {
        Affine(Matrix4::identity())
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// Reads four rows of four whitespace separated numbers.
    pub fn read_mat(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RegistrationError::missing_artifact(path, "read transform"));
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|reason| RegistrationError::invalid_transform(path, reason))
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let rows: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if rows.len() != 4 {
            return Err(format!("expected 4 rows, found {}", rows.len()));
        }
        let mut m = Matrix4::zeros();
        for (r, row) in rows.iter().enumerate() {
            let values: Vec<f64> = row
                .split_whitespace()
                .map(|v| v.parse::<f64>().map_err(|e| format!("row {}: {e}", r + 1)))
                .collect::<std::result::Result<_, _>>()?;
            if values.len() != 4 {
                return Err(format!("row {} has {} columns", r + 1, values.len()));
            }
            for (c, v) in values.into_iter().enumerate() {
                m[(r, c)] = v;
            }
        }
        Ok(Affine(m))
    }

    pub fn write_mat(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }

    /// Transform that applies `self` first, then `next`.
    ///
    /// Matrices act on column vectors, so the product is `next * self`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine(next.0 * self.0)
    }

    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        self.0.transform_point(point)
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..4 {
            let row: Vec<String> = (0..4).map(|c| format!("{:.10}", self.0[(r, c)])).collect();
            writeln!(f, "{}  ", row.join("  "))?;
        }
        Ok(())
    }
}
