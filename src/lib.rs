//! Registration of diffusion and functional MRI to an atlas.
//!
//! The numerical work is done by FSL (flirt, mcflirt, eddy_correct,
//! convert_xfm); this crate sequences those tools, passes intermediate
//! files between them and re-grids the result onto the atlas lattice.

pub mod backend;
pub mod common;
pub mod config;
pub mod error;
pub mod gradients;
pub mod naming;
pub mod register;
pub mod resample;
pub mod transform;
pub mod volume;

pub use backend::{FslBackend, RegistrationBackend, ToolInvocation};
pub use common::{Modality, Stage};
pub use config::{load_config, CleanupPolicy, PipelineConfig};
pub use error::{RegistrationError, Result};
pub use gradients::GradientTable;
pub use register::Registration;
pub use transform::Affine;
pub use volume::Volume;
