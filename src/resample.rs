//! Nearest-neighbour re-gridding of a volume onto another volume's lattice.
//!
//! Used after the transform-based resampling to make the output share the
//! atlas's exact voxel grid. Values are copied, never recomputed.

use nalgebra::{Matrix4, Point3};
use ndarray::{ArrayD, IxDyn};
use std::path::Path;

use crate::error::{RegistrationError, Result};
use crate::volume::{set_grid, Volume};

/// Re-grids `source` onto `target_affine` / `target_shape`.
///
/// A 4D source keeps its frame count. Target voxels that fall outside the
/// source grid are set to 0.
pub fn resample_to_grid(
    source: &Volume,
    source_path: &Path,
    target_affine: &Matrix4<f64>,
    target_shape: [usize; 3],
) -> Result<ArrayD<f32>> {
    let source_affine = source.affine();
    let inv_source = source_affine.try_inverse().ok_or_else(|| {
        RegistrationError::invalid_volume(source_path, "affine is not invertible")
    })?;
    // target voxel -> world -> source voxel
    let target_to_source = inv_source * target_affine;

    let src_shape = source.spatial_shape();
    let frames = source.frames();
    let is_stack = source.data.ndim() == 4;

    let mut out_shape = target_shape.to_vec();
    if is_stack {
        out_shape.push(frames);
    }
    let mut out = ArrayD::<f32>::zeros(IxDyn(&out_shape));

    for i in 0..target_shape[0] {
        for j in 0..target_shape[1] {
            for k in 0..target_shape[2] {
                let p = target_to_source.transform_point(&Point3::new(i as f64, j as f64, k as f64));
                let src = match nearest_index(&p, src_shape) {
                    Some(idx) => idx,
                    None => continue,
                };
                if is_stack {
                    for t in 0..frames {
                        out[IxDyn(&[i, j, k, t])] =
                            source.data[IxDyn(&[src[0], src[1], src[2], t])];
                    }
                } else {
                    out[IxDyn(&[i, j, k])] = source.data[IxDyn(&src)];
                }
            }
        }
    }
    Ok(out)
}

fn nearest_index(p: &Point3<f64>, shape: [usize; 3]) -> Option<[usize; 3]> {
    let mut idx = [0usize; 3];
    for axis in 0..3 {
        let r = p[axis].round();
        if r < 0.0 || r >= shape[axis] as f64 {
            return None;
        }
        idx[axis] = r as usize;
    }
    Some(idx)
}

/// Re-grids `source` onto `target`'s affine and spatial shape, keeping the
/// rest of `source`'s header.
pub fn resample_like(source: &Volume, source_path: &Path, target: &Volume) -> Result<Volume> {
    let target_affine = target.affine();
    let data = resample_to_grid(source, source_path, &target_affine, target.spatial_shape())?;

    let mut header = source.header.clone();
    set_grid(&mut header, &target_affine);
    Ok(Volume::from_parts(header, data))
}
