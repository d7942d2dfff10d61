//! Registration of single volumes to one another, of the frames within a
//! 4D stack, and the full DTI -> MPRAGE -> atlas chain.
//!
//! Every step checks that its inputs exist, runs, then checks that its
//! output exists, so a tool that exits cleanly without writing anything is
//! reported as a [`RegistrationError::MissingArtifact`] instead of surfacing
//! later as an unreadable file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backend::RegistrationBackend;
use crate::common::{Modality, Stage};
use crate::config::{CleanupPolicy, PipelineConfig};
use crate::error::{RegistrationError, Result};
use crate::gradients::GradientTable;
use crate::naming::PipelineArtifacts;
use crate::resample::resample_like;
use crate::transform::Affine;
use crate::volume::Volume;

/// Pipeline orchestrator over a registration backend.
pub struct Registration<B> {
    backend: B,
    config: PipelineConfig,
}

impl<B: RegistrationBackend> Registration<B> {
    pub fn new(backend: B, config: PipelineConfig) -> Self {
        Self { backend, config }
    }

    pub fn with_defaults(backend: B) -> Self {
        Self::new(backend, PipelineConfig::default())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Computes the transform taking `input` into `reference` space and
    /// stores it at `transform`.
    pub fn align(&self, input: &Path, reference: &Path, transform: &Path) -> Result<()> {
        require(input, "align")?;
        require(reference, "align")?;
        self.backend
            .compute_affine(input, reference, transform, &self.config.align)?;
        require(transform, "align")
    }

    /// Resamples `input` into `reference` space with an existing transform.
    pub fn applyxfm(
        &self,
        input: &Path,
        reference: &Path,
        transform: &Path,
        aligned: &Path,
    ) -> Result<()> {
        require(input, "applyxfm")?;
        require(reference, "applyxfm")?;
        require(transform, "applyxfm")?;
        self.backend
            .apply_affine(input, reference, transform, aligned, &self.config.apply)?;
        require(aligned, "applyxfm")
    }

    /// Aligns every frame of `stack` to frame `ref_index`, with motion
    /// correction for fMRI and eddy-current correction for DTI.
    pub fn align_slices(
        &self,
        stack: &Path,
        corrected: &Path,
        ref_index: usize,
        modality: Modality,
    ) -> Result<()> {
        require(stack, "align_slices")?;
        info!("Aligning {} stack to frame {}", modality, ref_index);
        self.backend
            .correct_stack(stack, corrected, ref_index, modality)?;
        require(corrected, "align_slices")
    }

    /// Writes the transform applying `first` then `second`.
    pub fn compose(&self, first: &Path, second: &Path, output: &Path) -> Result<()> {
        require(first, "compose")?;
        require(second, "compose")?;
        self.backend.compose_affine(first, second, output)?;
        require(output, "compose")?;

        let composed = Affine::read_mat(output)?;
        debug!("Composed transform {}:\n{}", output.display(), composed);
        Ok(())
    }

    /// Re-grids `base` onto `template`'s affine and voxel lattice (nearest
    /// neighbour) and saves it as `ingested`.
    pub fn resample(&self, base: &Path, ingested: &Path, template: &Path) -> Result<()> {
        resample(base, ingested, template)
    }

    /// Registers a DTI stack to an atlas through a structural image.
    ///
    /// Intermediates go to `<outdir>/tmp/`. They are removed after success
    /// and, unless the cleanup policy is `always`, kept after a failure.
    pub fn mri2atlas(
        &self,
        mri: &Path,
        gtab: &GradientTable,
        mprage: &Path,
        atlas: &Path,
        aligned_mri: &Path,
        outdir: &Path,
    ) -> Result<()> {
        let artifacts = PipelineArtifacts::new(mri, mprage, atlas, outdir);
        fs::create_dir_all(&artifacts.tmp_dir)?;

        let result = self.run_chain(mri, gtab, mprage, atlas, aligned_mri, &artifacts);

        match (&result, self.config.cleanup) {
            (Ok(()), CleanupPolicy::Never) => {
                info!("Keeping intermediates in {}", artifacts.tmp_dir.display());
            }
            (Ok(()), _) => {
                stage(Stage::Cleanup);
                info!("Cleaning temporary registration files...");
                remove_intermediates(&artifacts)?;
            }
            (Err(e), CleanupPolicy::Always) => {
                warn!("Registration failed ({}), removing intermediates anyway", e);
                if let Err(cleanup) = remove_intermediates(&artifacts) {
                    warn!("Best-effort cleanup failed: {}", cleanup);
                }
            }
            (Err(e), _) => {
                warn!(
                    "Registration failed ({}), intermediates kept in {}",
                    e,
                    artifacts.tmp_dir.display()
                );
            }
        }
        result
    }

    fn run_chain(
        &self,
        mri: &Path,
        gtab: &GradientTable,
        mprage: &Path,
        atlas: &Path,
        aligned_mri: &Path,
        a: &PipelineArtifacts,
    ) -> Result<()> {
        require(mprage, "mri2atlas")?;
        require(atlas, "mri2atlas")?;
        let b0_index = gtab.first_b0()?;

        stage(Stage::SliceAlign);
        self.align_slices(mri, &a.corrected, b0_index, Modality::Diffusion)?;

        stage(Stage::ExtractRefFrame);
        let stack = Volume::load(&a.corrected)?;
        if stack.frames() != gtab.len() {
            return Err(RegistrationError::invalid_volume(
                &a.corrected,
                format!(
                    "{} frames but the gradient table has {} entries",
                    stack.frames(),
                    gtab.len()
                ),
            ));
        }
        stack.frame(b0_index, &a.corrected)?.save(&a.b0)?;
        drop(stack);

        stage(Stage::AlignToStructural);
        self.align(&a.b0, mprage, &a.dwi_to_structural)?;

        stage(Stage::AlignStructuralToAtlas);
        self.align(mprage, atlas, &a.structural_to_atlas)?;

        stage(Stage::ComposeTransforms);
        self.compose(&a.dwi_to_structural, &a.structural_to_atlas, &a.dwi_to_atlas)?;

        stage(Stage::ApplyComposed);
        self.applyxfm(&a.corrected, atlas, &a.dwi_to_atlas, &a.aligned)?;

        stage(Stage::ResampleFinal);
        self.resample(&a.aligned, aligned_mri, atlas)
    }
}

/// Re-grids `base` onto `template`'s affine and voxel lattice (nearest
/// neighbour) and saves it as `ingested`.
pub fn resample(base: &Path, ingested: &Path, template: &Path) -> Result<()> {
    let template_im = Volume::load(template)?;
    let base_im = Volume::load(base)?;
    let target_im = resample_like(&base_im, base, &template_im)?;
    target_im.save(ingested)?;
    require(ingested, "resample")
}

fn stage(stage: Stage) {
    info!("Stage {}/{}: {}", stage.to_usize() + 1, Stage::ALL.len(), stage);
}

fn require(path: &Path, step: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RegistrationError::missing_artifact(path, step))
    }
}

fn remove_intermediates(artifacts: &PipelineArtifacts) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in artifacts.removable() {
        match fs::remove_file(path) {
            Ok(()) => removed.push(path.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    debug!("Removed {} intermediate files", removed.len());
    Ok(removed)
}
