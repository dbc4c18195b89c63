//! Command-line arguments shared by `nordic-run` and `nordic-bids`

use std::path::PathBuf;

use clap::{ArgGroup, Args};

use crate::backends::{MatlabEngineBackend, McrBackend, NordicBackend};
use crate::error::{NordicError, Result};
use crate::noise::DEFAULT_MAD_THRESH;
use crate::pipeline::PipelineOptions;

/// Backend selection. Exactly one of `--matlab` / `--mcr` is required.
#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("backend")
        .required(true)
        .args(["matlab", "mcr"]),
))]
pub struct BackendArgs {
    /// Run NORDIC in a licensed MATLAB session
    #[arg(long, requires = "nordic_path")]
    pub matlab: bool,

    /// Run the compiled NORDIC pipeline through the MATLAB Compiler Runtime
    #[arg(long, requires = "mcr_path")]
    pub mcr: bool,

    /// Directory containing the NORDIC MATLAB scripts
    #[arg(long)]
    pub nordic_path: Option<PathBuf>,

    /// MATLAB executable
    #[arg(long, default_value = "matlab")]
    pub matlab_exe: PathBuf,

    /// MATLAB Compiler Runtime installation directory
    #[arg(long)]
    pub mcr_path: Option<PathBuf>,

    /// Directory holding run_nifti_nordic_pipeline.sh
    #[arg(long, default_value = "./nordic_mcr/")]
    pub nordic_mcr_path: PathBuf,
}

impl BackendArgs {
    pub fn build(&self) -> Result<Box<dyn NordicBackend>> {
        if self.matlab {
            let nordic_path = self
                .nordic_path
                .clone()
                .ok_or_else(|| NordicError::InvalidInput("--nordic-path is required with --matlab".into()))?;
            Ok(Box::new(MatlabEngineBackend::new(self.matlab_exe.clone(), nordic_path)))
        } else {
            let mcr_path = self
                .mcr_path
                .clone()
                .ok_or_else(|| NordicError::InvalidInput("--mcr-path is required with --mcr".into()))?;
            Ok(Box::new(McrBackend::new(mcr_path, self.nordic_mcr_path.clone())))
        }
    }
}

/// NORDIC and noise detection parameters
#[derive(Args, Debug, Clone)]
pub struct NordicOptionArgs {
    /// NORDIC temporal_phase parameter
    #[arg(long, default_value_t = 1)]
    pub temporal_phase: i32,

    /// NORDIC phase_filter_width parameter
    #[arg(long, default_value_t = 10.0)]
    pub phase_filter_width: f64,

    /// Volumes with variance below median - MAD_THRESH * MAD are noise scans
    #[arg(long, default_value_t = DEFAULT_MAD_THRESH)]
    pub mad_thresh: f64,
}

impl NordicOptionArgs {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            mad_thresh: self.mad_thresh,
            temporal_phase: self.temporal_phase,
            phase_filter_width: self.phase_filter_width,
        }
    }
}
