//! Run NORDIC over every magnitude/phase pair of a BIDS dataset.
//!
//! Outputs go to `<bids_root>/derivatives/nordic/`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use nordic_core::bids::BidsFilter;
use nordic_core::cli::{BackendArgs, NordicOptionArgs};
use nordic_core::pipeline::{run_bids, BidsRunOptions};

#[derive(Parser, Debug)]
#[command(name = "nordic-bids", version, about = "BIDS-aware NORDIC denoising with noise scan splitting")]
struct Cli {
    /// Root directory of the BIDS dataset
    bids_root: PathBuf,

    /// Reprocess series whose outputs already exist
    #[arg(long)]
    overwrite: bool,

    /// Only process these participants (with or without the sub- prefix)
    #[arg(long, num_args = 1..)]
    participant_label: Option<Vec<String>>,

    /// Only process these sessions (with or without the ses- prefix)
    #[arg(long, num_args = 1..)]
    session_label: Option<Vec<String>>,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(flatten)]
    nordic: NordicOptionArgs,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if !cli.bids_root.is_dir() {
        bail!("BIDS root {} is not a directory", cli.bids_root.display());
    }

    let backend = cli.backend.build()?;
    let options = BidsRunOptions {
        filter: BidsFilter::new(cli.participant_label, cli.session_label),
        overwrite: cli.overwrite,
        pipeline: cli.nordic.pipeline_options(),
    };

    let summary = run_bids(backend.as_ref(), &cli.bids_root, &options)?;
    if summary.failed() > 0 {
        bail!("{} series failed", summary.failed());
    }
    Ok(())
}
