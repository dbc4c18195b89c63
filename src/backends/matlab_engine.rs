//! NORDIC through a MATLAB session
//!
//! Each run acquires one engine session (a `matlab -batch` process), issues a
//! single `NIFTI_NORDIC` call and releases the session. [`EngineSession`]
//! kills and reaps the process if it is dropped before completing, so no
//! exit path leaves a MATLAB process behind.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

use super::{describe_output, NordicArgs, NordicBackend};
use crate::error::{NordicError, Result};

#[derive(Clone, Debug)]
pub struct MatlabEngineBackend {
    /// MATLAB executable (looked up on PATH when not absolute)
    pub matlab_exe: PathBuf,
    /// Directory containing the NORDIC MATLAB scripts
    pub nordic_path: PathBuf,
}

impl MatlabEngineBackend {
    pub fn new(matlab_exe: impl Into<PathBuf>, nordic_path: impl Into<PathBuf>) -> Self {
        Self {
            matlab_exe: matlab_exe.into(),
            nordic_path: nordic_path.into(),
        }
    }

    /// MATLAB statements executed by the session
    fn batch_script(&self, magnitude: &Path, phase: &Path, output_base: &str, args: &NordicArgs) -> String {
        format!(
            "addpath({}); \
             ARG = struct('temporal_phase', {}, 'phase_filter_width', {:?}, 'DIROUT', {}, 'noise_volume_last', {}); \
             NIFTI_NORDIC({}, {}, {}, ARG);",
            matlab_string(&self.nordic_path.to_string_lossy()),
            args.temporal_phase,
            args.phase_filter_width,
            matlab_string(&args.dirout),
            args.noise_volume_last,
            matlab_string(&magnitude.to_string_lossy()),
            matlab_string(&phase.to_string_lossy()),
            matlab_string(output_base),
        )
    }
}

/// Single-quoted MATLAB char array literal
fn matlab_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// A running MATLAB process owned for the duration of one call
struct EngineSession {
    child: Option<Child>,
}

impl EngineSession {
    fn start(matlab_exe: &Path, script: &str) -> io::Result<Self> {
        let child = Command::new(matlab_exe)
            .args(["-nodisplay", "-nosplash", "-batch", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(Self { child: Some(child) })
    }

    /// Wait for the session to exit and collect its output.
    fn finish(mut self) -> io::Result<Output> {
        match self.child.take() {
            Some(child) => child.wait_with_output(),
            None => Err(io::Error::new(ErrorKind::Other, "engine session already closed")),
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            log::warn!("shutting down MATLAB session (pid {})", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl NordicBackend for MatlabEngineBackend {
    fn name(&self) -> &'static str {
        "matlab"
    }

    fn run(&self, magnitude: &Path, phase: &Path, output_base: &str, args: &NordicArgs) -> Result<()> {
        let script = self.batch_script(magnitude, phase, output_base, args);
        log::debug!("{} -batch \"{}\"", self.matlab_exe.display(), script);

        let session = EngineSession::start(&self.matlab_exe, &script).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                NordicError::backend(
                    self.name(),
                    format!(
                        "MATLAB executable '{}' not found; install MATLAB or use the MCR backend",
                        self.matlab_exe.display()
                    ),
                )
            } else {
                NordicError::backend(self.name(), format!("failed to start MATLAB: {}", e))
            }
        })?;

        let output = session
            .finish()
            .map_err(|e| NordicError::backend(self.name(), format!("MATLAB session failed: {}", e)))?;

        if !output.status.success() {
            return Err(NordicError::backend(
                self.name(),
                format!("NIFTI_NORDIC exited with {}", describe_output(&output)),
            ));
        }
        Ok(())
    }
}
