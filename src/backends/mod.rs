//! External NORDIC denoising backends
//!
//! NORDIC itself is an opaque MATLAB pipeline. Two ways of reaching it are
//! provided behind the [`NordicBackend`] trait:
//! - `matlab_engine`: a licensed MATLAB session driven with `-batch`
//! - `mcr`: the compiled pipeline run through the MATLAB Compiler Runtime
//!
//! Either backend writes `<DIROUT>/<output_base>.nii[.gz]` as a side effect.

pub mod matlab_engine;
pub mod mcr;

use std::path::Path;
use std::process::Output;

pub use matlab_engine::MatlabEngineBackend;
pub use mcr::McrBackend;

use crate::error::Result;

/// Parameters forwarded to `NIFTI_NORDIC`
#[derive(Clone, Debug, PartialEq)]
pub struct NordicArgs {
    pub temporal_phase: i32,
    pub phase_filter_width: f64,
    /// Number of trailing noise volumes in the input series
    pub noise_volume_last: usize,
    /// Output directory, with trailing separator
    pub dirout: String,
}

impl Default for NordicArgs {
    fn default() -> Self {
        Self {
            temporal_phase: 1,
            phase_filter_width: 10.0,
            noise_volume_last: 0,
            dirout: "./".to_string(),
        }
    }
}

/// A way of running the NORDIC pipeline on one magnitude/phase pair
pub trait NordicBackend {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Run NORDIC; blocks until the external pipeline has finished.
    ///
    /// # Arguments
    /// * `magnitude` - Magnitude image (.nii or .nii.gz)
    /// * `phase` - Phase image (.nii or .nii.gz)
    /// * `output_base` - Output file name without extension
    /// * `args` - NORDIC parameters
    fn run(&self, magnitude: &Path, phase: &Path, output_base: &str, args: &NordicArgs) -> Result<()>;
}

/// Format captured process output for an error message
pub(crate) fn describe_output(output: &Output) -> String {
    format!(
        "{}\nSTDOUT:\n{}\nSTDERR:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}
