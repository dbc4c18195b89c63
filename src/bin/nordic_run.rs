//! Run NORDIC on a single magnitude/phase pair and split off noise scans.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nordic_core::cli::{BackendArgs, NordicOptionArgs};
use nordic_core::pipeline::{run_single, SingleRunOptions};

#[derive(Parser, Debug)]
#[command(name = "nordic-run", version, about = "NORDIC denoising with automatic noise scan splitting")]
struct Cli {
    /// Magnitude image (.nii or .nii.gz)
    magnitude_image: PathBuf,

    /// Phase image (.nii or .nii.gz)
    phase_image: PathBuf,

    /// Output directory (default: the magnitude image's directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Prefix for the NORDIC output file name
    #[arg(long, default_value = "NORDIC_")]
    output_prefix: String,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(flatten)]
    nordic: NordicOptionArgs,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let backend = cli.backend.build()?;
    let options = SingleRunOptions {
        output_dir: cli.output_dir,
        output_prefix: cli.output_prefix,
        pipeline: cli.nordic.pipeline_options(),
    };

    let report = run_single(backend.as_ref(), &cli.magnitude_image, &cli.phase_image, &options)
        .with_context(|| format!("processing {}", cli.magnitude_image.display()))?;

    log::info!("NORDIC output: {}", report.nordic_file.display());
    for path in &report.written {
        log::info!("Wrote {}", path.display());
    }
    Ok(())
}
