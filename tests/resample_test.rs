//! File-level tests for nearest-neighbour re-gridding.

mod common;

use atlasreg::register::resample;
use atlasreg::{RegistrationError, Volume};
use common::{scaled_affine, write_volume};
use nalgebra::{Matrix4, Rotation3};
use nifti::NiftiType;
use tempfile::tempdir;

#[test]
fn test_resample_is_idempotent() {
    let dir = tempdir().unwrap();
    let source = write_volume(
        &dir.path().join("source.nii.gz"),
        &[6, 5, 4],
        &scaled_affine(2.0, -3.0),
    );
    let mut target_affine =
        Rotation3::from_euler_angles(0.1, 0.0, -0.2).to_homogeneous() * Matrix4::new_scaling(1.5);
    target_affine[(0, 3)] = -1.0;
    target_affine[(1, 3)] = 0.5;
    let target = write_volume(&dir.path().join("target.nii.gz"), &[7, 7, 6], &target_affine);

    let once = dir.path().join("once.nii.gz");
    let twice = dir.path().join("twice.nii.gz");
    resample(&source, &once, &target).unwrap();
    resample(&once, &twice, &target).unwrap();

    let a = Volume::load(&once).unwrap();
    let b = Volume::load(&twice).unwrap();
    assert_eq!(a.data.shape(), b.data.shape());
    assert_eq!(a.data, b.data);
    assert!((a.affine() - b.affine()).abs().max() < 1e-6);
}

#[test]
fn test_resample_output_matches_target_grid() {
    let dir = tempdir().unwrap();
    let source = write_volume(
        &dir.path().join("dwi.nii.gz"),
        &[4, 4, 4, 2],
        &scaled_affine(2.0, 0.0),
    );
    let target = write_volume(
        &dir.path().join("atlas.nii.gz"),
        &[8, 8, 8],
        &scaled_affine(1.0, 0.0),
    );
    let output = dir.path().join("out.nii.gz");
    resample(&source, &output, &target).unwrap();

    let out = Volume::load(&output).unwrap();
    let atlas = Volume::load(&target).unwrap();
    assert_eq!(out.data.shape(), &[8, 8, 8, 2]);
    assert!((out.affine() - atlas.affine()).abs().max() < 1e-6);
    assert!((out.header.pixdim[1] - 1.0).abs() < 1e-6);
}

#[test]
fn test_resample_translation_shifts_values() {
    let dir = tempdir().unwrap();
    let source = write_volume(
        &dir.path().join("s.nii"),
        &[5, 5, 5],
        &scaled_affine(1.0, 0.0),
    );
    let mut shifted = scaled_affine(1.0, 0.0);
    shifted[(0, 3)] = 1.0;
    let target = write_volume(&dir.path().join("t.nii"), &[5, 5, 5], &shifted);
    let output = dir.path().join("o.nii");
    resample(&source, &output, &target).unwrap();

    let src = Volume::load(&source).unwrap();
    let out = Volume::load(&output).unwrap();
    // target voxel i sits on source voxel i + 1
    assert_eq!(out.data[[0usize, 2, 3].as_slice()], src.data[[1usize, 2, 3].as_slice()]);
    assert_eq!(out.data[[4usize, 2, 3].as_slice()], 0.0);
}

#[test]
fn test_resample_rejects_unreadable_input() {
    let dir = tempdir().unwrap();
    let target = write_volume(
        &dir.path().join("t.nii"),
        &[2, 2, 2],
        &scaled_affine(1.0, 0.0),
    );
    let bogus = dir.path().join("bogus.nii");
    std::fs::write(&bogus, b"definitely not nifti").unwrap();

    let err = resample(&bogus, &dir.path().join("o.nii"), &target).unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidVolume { .. }));
}

#[test]
fn test_resample_qform_only_input() {
    let dir = tempdir().unwrap();
    let source = write_volume(&dir.path().join("s.nii"), &[3, 3, 3], &scaled_affine(1.0, 0.0));
    let mut vol = Volume::load(&source).unwrap();
    vol.header.sform_code = 0;
    vol.header.qform_code = 1;
    vol.header.pixdim[0] = 0.0;
    let qonly = dir.path().join("qonly.nii");
    vol.save(&qonly).unwrap();

    let output = dir.path().join("o.nii");
    resample(&qonly, &output, &source).unwrap();
    let out = Volume::load(&output).unwrap();
    assert_eq!(out.data, vol.data);
}

#[test]
fn test_resample_rejects_output_without_nifti_extension() {
    let dir = tempdir().unwrap();
    let source = write_volume(&dir.path().join("s.nii"), &[3, 3, 3], &scaled_affine(1.0, 0.0));
    let requested = dir.path().join("sub-01.run-1_aligned");

    let err = resample(&source, &requested, &source).unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidVolume { .. }));
    assert!(!requested.exists());
    assert!(!dir.path().join("sub-01.nii").exists());
}

#[test]
fn test_resample_keeps_integer_datatype() {
    let dir = tempdir().unwrap();
    let source = write_volume(&dir.path().join("s.nii"), &[4, 4, 4], &scaled_affine(2.0, 0.0));
    let mut vol = Volume::load(&source).unwrap();
    vol.header.datatype = NiftiType::Int16 as i16;
    let int16 = dir.path().join("int16.nii.gz");
    vol.save(&int16).unwrap();
    let target = write_volume(&dir.path().join("t.nii"), &[8, 8, 8], &scaled_affine(1.0, 0.0));

    let output = dir.path().join("o.nii.gz");
    resample(&int16, &output, &target).unwrap();
    let out = Volume::load(&output).unwrap();
    assert_eq!(out.header.datatype, NiftiType::Int16 as i16);
    assert_eq!(out.data.shape(), &[8, 8, 8]);
}
