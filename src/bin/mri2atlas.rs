//! Commandline utility to register a DTI stack to an atlas.
//!
//! The stack is eddy-corrected to its first B0 frame, the B0 is aligned to a
//! structural (MPRAGE) image, the structural image is aligned to the atlas,
//! and the composed transform brings the whole stack into atlas space. FSL
//! must be installed; set `FSLDIR` or pass a config file naming the tools.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use atlasreg::config::CleanupPolicy;
use atlasreg::{load_config, FslBackend, GradientTable, Registration};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the 4D diffusion nifti file
    #[arg(short, long)]
    dwi: PathBuf,

    /// b-values file; if omitted, `<dwi stem>*.bval` next to the dwi is used
    #[arg(long)]
    bvals: Option<PathBuf>,

    /// b-vectors file; if omitted, `<dwi stem>*.bvec` next to the dwi is used
    #[arg(long)]
    bvecs: Option<PathBuf>,

    /// the structural (MPRAGE) nifti file
    #[arg(short, long)]
    structural: PathBuf,

    /// the atlas nifti file
    #[arg(short, long)]
    atlas: PathBuf,

    /// the name of the registered output nifti file
    #[arg(short, long)]
    output: PathBuf,

    /// directory whose `tmp/` subdirectory holds intermediate files
    #[arg(short, long, default_value = "./")]
    work_dir: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// keep intermediate files even when registration succeeds
    #[arg(short, long)]
    keep_intermediates: bool,
}

fn run(cli: Args) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level)
            .with_context(|| format!("invalid logging.level `{}`", config.logging.level))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.keep_intermediates {
        config.cleanup = CleanupPolicy::Never;
    }
    if cli.output.exists() {
        bail!("Output file already exists. Please specify a different output file or remove existing file.");
    }

    let (bvals, bvecs) = match cli.bvals {
        Some(bvals) => (bvals, cli.bvecs),
        None => {
            let (bvals, found) = GradientTable::discover(&cli.dwi)?;
            (bvals, cli.bvecs.or(found))
        }
    };
    let gtab = GradientTable::from_files(
        &bvals,
        bvecs.as_deref(),
        config.gradients.b0_threshold,
    )
    .with_context(|| format!("loading gradient table {}", bvals.display()))?;

    let backend = FslBackend::new(config.tools.clone());
    let registration = Registration::new(backend, config);
    registration.mri2atlas(
        &cli.dwi,
        &gtab,
        &cli.structural,
        &cli.atlas,
        &cli.output,
        &cli.work_dir,
    )?;

    println!("Registered output: {}", cli.output.display());
    Ok(())
}

// main function parses commandline arguments and runs the program
fn main() {
    let cli = Args::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error! {:#}", e);
        std::process::exit(-2);
    }
}
