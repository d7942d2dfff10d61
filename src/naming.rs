//! Names of the intermediate files written by `mri2atlas`.
//!
//! All intermediates live in `<work_dir>/tmp/` and are derived from the
//! input file stems, so two runs over different subjects never collide while
//! two runs over the same subject and work dir do.

use std::path::{Path, PathBuf};

/// Base name with up to two trailing extensions stripped.
///
/// `/data/subj01_dwi.nii.gz` -> `subj01_dwi`, `mprage.nii` -> `mprage`.
pub fn stem(path: &Path) -> String {
    let once = match path.file_stem() {
        Some(name) => PathBuf::from(name),
        None => return String::new(),
    };
    let twice = once.file_stem().map(PathBuf::from).unwrap_or(once);
    twice.to_string_lossy().into_owned()
}

pub fn tmp_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("tmp")
}

/// `<work_dir>/tmp/<stem>_<suffix>.nii.gz`
pub fn intermediate_volume(work_dir: &Path, stem: &str, suffix: &str) -> PathBuf {
    tmp_dir(work_dir).join(format!("{stem}_{suffix}.nii.gz"))
}

/// `<work_dir>/tmp/<from>_<to>_xfm.mat`
pub fn transform_file(work_dir: &Path, from: &str, to: &str) -> PathBuf {
    tmp_dir(work_dir).join(format!("{from}_{to}_xfm.mat"))
}

/// Every intermediate path of one `mri2atlas` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineArtifacts {
    pub tmp_dir: PathBuf,
    /// slice-aligned 4D stack
    pub corrected: PathBuf,
    /// eddy_correct's registration log, written next to `corrected`
    pub correction_log: PathBuf,
    /// composed transform applied to the stack, before re-gridding
    pub aligned: PathBuf,
    pub b0: PathBuf,
    pub dwi_to_structural: PathBuf,
    pub structural_to_atlas: PathBuf,
    pub dwi_to_atlas: PathBuf,
}

impl PipelineArtifacts {
    pub fn new(dwi: &Path, structural: &Path, atlas: &Path, work_dir: &Path) -> Self {
        let dwi_name = stem(dwi);
        let structural_name = stem(structural);
        let atlas_name = stem(atlas);
        let tmp = tmp_dir(work_dir);

        Self {
            correction_log: tmp.join(format!("{dwi_name}_t2.ecclog")),
            corrected: intermediate_volume(work_dir, &dwi_name, "t2"),
            aligned: intermediate_volume(work_dir, &dwi_name, "ta"),
            b0: intermediate_volume(work_dir, &dwi_name, "b0"),
            dwi_to_structural: transform_file(work_dir, &dwi_name, &structural_name),
            structural_to_atlas: transform_file(work_dir, &structural_name, &atlas_name),
            dwi_to_atlas: transform_file(work_dir, &dwi_name, &atlas_name),
            tmp_dir: tmp,
        }
    }

    /// Files removed by cleanup, in removal order.
    pub fn removable(&self) -> [&Path; 7] {
        [
            &self.corrected,
            &self.aligned,
            &self.b0,
            &self.dwi_to_structural,
            &self.structural_to_atlas,
            &self.dwi_to_atlas,
            &self.correction_log,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_strips_two_extensions() {
        assert_eq!(stem(Path::new("/data/subj01_dwi.nii.gz")), "subj01_dwi");
        assert_eq!(stem(Path::new("mprage.nii")), "mprage");
        assert_eq!(stem(Path::new("atlas")), "atlas");
        assert_eq!(stem(Path::new("a.b.c.d")), "a.b");
    }

    #[test]
    fn test_b0_name() {
        let artifacts = PipelineArtifacts::new(
            Path::new("/data/subj01_dwi.nii.gz"),
            Path::new("/data/subj01_mprage.nii.gz"),
            Path::new("/atlas/MNI152_T1_1mm.nii.gz"),
            Path::new("/out"),
        );
        assert_eq!(artifacts.b0, PathBuf::from("/out/tmp/subj01_dwi_b0.nii.gz"));
        assert_eq!(
            artifacts.corrected,
            PathBuf::from("/out/tmp/subj01_dwi_t2.nii.gz")
        );
        assert_eq!(
            artifacts.dwi_to_structural,
            PathBuf::from("/out/tmp/subj01_dwi_subj01_mprage_xfm.mat")
        );
        assert_eq!(
            artifacts.structural_to_atlas,
            PathBuf::from("/out/tmp/subj01_mprage_MNI152_T1_1mm_xfm.mat")
        );
        assert_eq!(
            artifacts.dwi_to_atlas,
            PathBuf::from("/out/tmp/subj01_dwi_MNI152_T1_1mm_xfm.mat")
        );
    }

    #[test]
    fn test_everything_under_tmp() {
        let artifacts = PipelineArtifacts::new(
            Path::new("dwi.nii.gz"),
            Path::new("t1.nii.gz"),
            Path::new("atlas.nii.gz"),
            Path::new("/work"),
        );
        for path in artifacts.removable() {
            assert_eq!(path.parent(), Some(Path::new("/work/tmp")));
        }
    }
}
