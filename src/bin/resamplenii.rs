//! Quick commandline utility to resample a nifti file onto another file's voxel grid.
//!
//! Images that already overlap in world coordinates are re-gridded with nearest
//! neighbour interpolation so they also overlap voxel for voxel. The output takes
//! the reference's affine and spatial shape; a 4D input keeps its frames.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use atlasreg::register::resample;
use atlasreg::Volume;

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input nifti file
    #[arg(short, long)]
    input: String,

    /// the nifti file whose grid the input is resampled onto
    #[arg(short, long)]
    reference: String,

    /// the name of the output nifti file
    #[arg(short, long, default_value = "resampled.nii.gz")]
    output: String,
}

fn run(cli: Args) -> Result<()> {
    let input_filename = Path::new(&cli.input);
    let reference_filename = Path::new(&cli.reference);
    let output_filename = Path::new(&cli.output);

    if !input_filename.exists() {
        bail!("Did not find input nifti file. Use -i to pass an existing file.");
    }
    if !reference_filename.exists() {
        bail!("Did not find reference nifti file. Use -r to pass an existing file.");
    }
    if output_filename.exists() {
        bail!("Output file already exists. Please specify a different output file or remove existing file.");
    }

    resample(input_filename, output_filename, reference_filename)
        .with_context(|| format!("resampling {}", input_filename.display()))?;

    let out = Volume::load(output_filename)?;
    println!("Final shape: {:?}", out.data.shape());
    Ok(())
}

// main function parses commandline arguments and runs the program
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Args::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error! {:#}", e);
        std::process::exit(-2);
    }
}
