//! Compiled NORDIC through the MATLAB Compiler Runtime
//!
//! Runs `<nordic_mcr_path>/run_nifti_nordic_pipeline.sh` with positional
//! arguments. The argument order is fixed by the compiled entry point.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{describe_output, NordicArgs, NordicBackend};
use crate::error::{NordicError, Result};

const RUNNER_SCRIPT: &str = "run_nifti_nordic_pipeline.sh";

#[derive(Clone, Debug)]
pub struct McrBackend {
    /// MATLAB Compiler Runtime installation directory
    pub mcr_path: PathBuf,
    /// Directory holding the compiled NORDIC runner
    pub nordic_mcr_path: PathBuf,
}

impl McrBackend {
    pub fn new(mcr_path: impl Into<PathBuf>, nordic_mcr_path: impl Into<PathBuf>) -> Self {
        Self {
            mcr_path: mcr_path.into(),
            nordic_mcr_path: nordic_mcr_path.into(),
        }
    }

    pub fn script_path(&self) -> PathBuf {
        self.nordic_mcr_path.join(RUNNER_SCRIPT)
    }

    /// mcr_path, magnitude, phase, base, temporal_phase, phase_filter_width, DIROUT, noise_volume_last
    fn positional_args(
        &self,
        magnitude: &Path,
        phase: &Path,
        output_base: &str,
        args: &NordicArgs,
    ) -> Vec<OsString> {
        vec![
            self.mcr_path.clone().into_os_string(),
            magnitude.as_os_str().to_owned(),
            phase.as_os_str().to_owned(),
            OsString::from(output_base),
            OsString::from(args.temporal_phase.to_string()),
            // Debug formatting keeps the decimal point (10.0, not 10)
            OsString::from(format!("{:?}", args.phase_filter_width)),
            OsString::from(&args.dirout),
            OsString::from(args.noise_volume_last.to_string()),
        ]
    }
}

impl NordicBackend for McrBackend {
    fn name(&self) -> &'static str {
        "mcr"
    }

    fn run(&self, magnitude: &Path, phase: &Path, output_base: &str, args: &NordicArgs) -> Result<()> {
        let script = self.script_path();
        let argv = self.positional_args(magnitude, phase, output_base, args);
        log::debug!("running {} {:?}", script.display(), argv);

        let output = Command::new(&script).args(&argv).output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                NordicError::backend(
                    self.name(),
                    format!("Could not find the compiled NORDIC runner script at: {}", script.display()),
                )
            } else {
                NordicError::backend(self.name(), format!("failed to launch {}: {}", script.display(), e))
            }
        })?;

        if !output.status.success() {
            return Err(NordicError::backend(
                self.name(),
                format!("NORDIC (MCR) exited with {}", describe_output(&output)),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn args() -> NordicArgs {
        NordicArgs {
            temporal_phase: 3,
            phase_filter_width: 10.0,
            noise_volume_last: 2,
            dirout: "/out/".to_string(),
        }
    }

    #[test]
    fn test_positional_encoding() {
        let backend = McrBackend::new("/opt/mcr/v912", "/opt/nordic_mcr");
        let argv = backend.positional_args(Path::new("/d/mag.nii.gz"), Path::new("/d/ph.nii.gz"), "NORDIC_mag", &args());
        let argv: Vec<String> = argv.into_iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            argv,
            vec!["/opt/mcr/v912", "/d/mag.nii.gz", "/d/ph.nii.gz", "NORDIC_mag", "3", "10.0", "/out/", "2"]
        );
        assert_eq!(backend.script_path(), PathBuf::from("/opt/nordic_mcr/run_nifti_nordic_pipeline.sh"));
    }

    #[test]
    #[serial]
    fn test_missing_script_is_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let backend = McrBackend::new("/opt/mcr", dir.path().join("absent"));
        let err = backend
            .run(Path::new("mag.nii"), Path::new("ph.nii"), "base", &args())
            .unwrap_err();
        match err {
            NordicError::ExternalBackendFailure { backend, message } => {
                assert_eq!(backend, "mcr");
                assert!(message.contains(RUNNER_SCRIPT), "{}", message);
            }
            other => panic!("expected ExternalBackendFailure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(RUNNER_SCRIPT);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_runner_receives_positional_args() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("argv.txt");
        write_script(dir.path(), &format!("echo \"$@\" > '{}'", record.display()));

        let backend = McrBackend::new("/opt/mcr", dir.path());
        backend
            .run(Path::new("mag.nii"), Path::new("ph.nii"), "base", &args())
            .unwrap();

        let recorded = std::fs::read_to_string(&record).unwrap();
        assert_eq!(recorded.trim(), "/opt/mcr mag.nii ph.nii base 3 10.0 /out/ 2");
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_nonzero_exit_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "echo 'license checkout failed' >&2\nexit 3");

        let backend = McrBackend::new("/opt/mcr", dir.path());
        let err = backend
            .run(Path::new("mag.nii"), Path::new("ph.nii"), "base", &args())
            .unwrap_err();
        assert!(err.to_string().contains("license checkout failed"), "{}", err);
    }
}
