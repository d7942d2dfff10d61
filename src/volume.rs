//! NIfTI volumes held in memory.
//!
//! A [`Volume`] is the voxel array (3D, or 4D with frames on the last axis)
//! together with the header it was read with. Stages never modify a volume
//! on disk; each one writes a new path.
//!
//! Voxels are held as `f32` in memory. [`Volume::save`] writes them back in
//! the header's datatype when that is an unscaled integer or `f64` type, so
//! an int16 stack stays int16 on disk. Other inputs are written as `f32`.

use nalgebra::Matrix4;
use ndarray::{ArrayD, Axis};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};
use std::path::Path;

use crate::error::{RegistrationError, Result};

#[derive(Debug, Clone)]
pub struct Volume {
    pub header: NiftiHeader,
    pub data: ArrayD<f32>,
}

impl Volume {
    /// Builds a volume with a fresh header carrying `affine`.
    pub fn new(data: ArrayD<f32>, affine: &Matrix4<f64>) -> Self {
        let mut header = NiftiHeader::default();
        set_grid(&mut header, affine);
        Self { header, data }
    }

    pub fn from_parts(header: NiftiHeader, data: ArrayD<f32>) -> Self {
        Self { header, data }
    }

    /// Reads a 3D or 4D NIfTI file (`.nii` or `.nii.gz`).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RegistrationError::missing_artifact(path, "load volume"));
        }
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(|e| RegistrationError::invalid_volume(path, e.to_string()))?;
        let mut header = obj.header().clone();
        check_qform(&mut header, path)?;
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|e| RegistrationError::invalid_volume(path, e.to_string()))?;
        if data.ndim() != 3 && data.ndim() != 4 {
            return Err(RegistrationError::invalid_volume(
                path,
                format!("expected a 3D or 4D image, found {} dimensions", data.ndim()),
            ));
        }
        Ok(Self { header, data })
    }

    /// Writes a `.nii` or `.nii.gz` file in [`Volume::storage_type`].
    pub fn save(&self, path: &Path) -> Result<()> {
        check_output_path(path)?;
        let writer = WriterOptions::new(path).reference_header(&self.header);
        let written = match self.storage_type() {
            NiftiType::Uint8 => writer.write_nifti(&self.data.mapv(|v| v.round() as u8)),
            NiftiType::Int8 => writer.write_nifti(&self.data.mapv(|v| v.round() as i8)),
            NiftiType::Uint16 => writer.write_nifti(&self.data.mapv(|v| v.round() as u16)),
            NiftiType::Int16 => writer.write_nifti(&self.data.mapv(|v| v.round() as i16)),
            NiftiType::Uint32 => writer.write_nifti(&self.data.mapv(|v| v.round() as u32)),
            NiftiType::Int32 => writer.write_nifti(&self.data.mapv(|v| v.round() as i32)),
            NiftiType::Float64 => writer.write_nifti(&self.data.mapv(f64::from)),
            _ => writer.write_nifti(&self.data),
        };
        written.map_err(|e| RegistrationError::invalid_volume(path, e.to_string()))
    }

    /// On-disk datatype used by [`Volume::save`]: the header's own type when
    /// the stored values are unscaled, `f32` otherwise.
    pub fn storage_type(&self) -> NiftiType {
        let unscaled = (self.header.scl_slope == 0.0 || self.header.scl_slope == 1.0)
            && self.header.scl_inter == 0.0;
        match self.header.data_type() {
            Ok(datatype) if unscaled => datatype,
            _ => NiftiType::Float32,
        }
    }

    /// Voxel-to-world transform from the header (sform, then qform).
    pub fn affine(&self) -> Matrix4<f64> {
        self.header.affine::<f64>()
    }

    pub fn spatial_shape(&self) -> [usize; 3] {
        let shape = self.data.shape();
        [shape[0], shape[1], shape[2]]
    }

    /// Number of frames along the fourth axis, 1 for a 3D volume.
    pub fn frames(&self) -> usize {
        if self.data.ndim() == 4 {
            self.data.shape()[3]
        } else {
            1
        }
    }

    /// Copies frame `index` of a 4D stack into a new 3D volume with the
    /// stack's affine and header.
    pub fn frame(&self, index: usize, path: &Path) -> Result<Volume> {
        if self.data.ndim() != 4 {
            return Err(RegistrationError::invalid_volume(
                path,
                format!("expected a 4D stack, found {} dimensions", self.data.ndim()),
            ));
        }
        if index >= self.frames() {
            return Err(RegistrationError::invalid_volume(
                path,
                format!("frame {index} out of range for {} frames", self.frames()),
            ));
        }
        let frame = self.data.index_axis(Axis(3), index).to_owned();

        // shave off dimension 4
        let mut header = self.header.clone();
        header.dim[0] = 3;
        header.dim[4] = 1;
        Ok(Volume::from_parts(header, frame))
    }
}

/// The nifti writer swaps the last extension of its path for `.nii` or
/// `.nii.gz`, so only paths that survive that swap unchanged are accepted.
fn check_output_path(path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = if name.ends_with(".nii.gz") {
        "nii.gz"
    } else if name.ends_with(".nii") {
        "nii"
    } else {
        return Err(RegistrationError::invalid_volume(
            path,
            "output name must end in .nii or .nii.gz",
        ));
    };
    let mut resolved = path.to_path_buf();
    resolved.set_extension("");
    let resolved = resolved.with_extension(extension);
    if resolved != path {
        return Err(RegistrationError::invalid_volume(
            path,
            format!("output would be written to {}", resolved.display()),
        ));
    }
    Ok(())
}

/// Makes a qform-only header safe to turn into an affine. A qfac
/// (`pixdim[0]`) of 0 reads as 1; any other qfac that is not +-1, or a
/// negative voxel spacing, is rejected.
fn check_qform(header: &mut NiftiHeader, path: &Path) -> Result<()> {
    if header.sform_code != 0 || header.qform_code == 0 {
        return Ok(());
    }
    let qfac = header.pixdim[0];
    if qfac == 0.0 {
        header.pixdim[0] = 1.0;
    } else if (qfac.abs() - 1.0).abs() <= 1e-6 {
        header.pixdim[0] = qfac.signum();
    } else {
        return Err(RegistrationError::invalid_volume(
            path,
            format!("qfac (pixdim[0]) is {qfac}, expected 1 or -1"),
        ));
    }
    if header.pixdim[1..4].iter().any(|s| s.is_nan() || *s < 0.0) {
        return Err(RegistrationError::invalid_volume(
            path,
            format!("negative voxel spacing {:?}", &header.pixdim[1..4]),
        ));
    }
    Ok(())
}

/// Writes `affine` into the header and matches the voxel sizes to it.
pub fn set_grid(header: &mut NiftiHeader, affine: &Matrix4<f64>) {
    header.set_affine(affine);
    for axis in 0..3 {
        let spacing = (0..3)
            .map(|row| affine[(row, axis)].powi(2))
            .sum::<f64>()
            .sqrt();
        if spacing > 0.0 {
            header.pixdim[axis + 1] = spacing as f32;
        }
    }
}
