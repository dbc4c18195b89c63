//! Common test utilities for nordic-core integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use nordic_core::backends::{NordicArgs, NordicBackend};
use nordic_core::nifti_io::{read_nifti_file, save_nifti_to_file, NiftiSeries};
use nordic_core::{NordicError, Result, VolumeSeries};

/// Series whose volumes `noise_from..n` have tiny variance (≈0.001) and the
/// rest unit variance. Seeded, so repeated calls give identical data.
pub fn synthetic_series(dims: (usize, usize, usize), n: usize, noise_from: usize, seed: u64) -> VolumeSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let signal = Normal::new(100.0, 1.0).unwrap();
    let noise = Normal::new(0.0, 0.001f64.sqrt()).unwrap();
    VolumeSeries::from_fn(dims, n, |_, _, _, t| {
        if t < noise_from {
            signal.sample(&mut rng)
        } else {
            noise.sample(&mut rng)
        }
    })
}

/// Wrap a series with a 2 mm isotropic geometry and TR = 1.5 s
pub fn with_geometry(series: VolumeSeries) -> NiftiSeries {
    let mut affine = [0.0; 16];
    affine[0] = 2.0;
    affine[5] = 2.0;
    affine[10] = 2.0;
    affine[3] = -90.0;
    affine[7] = -126.0;
    affine[11] = -72.0;
    affine[15] = 1.0;
    NiftiSeries {
        series,
        voxel_size: (2.0, 2.0, 2.0),
        affine,
        repetition_time: 1.5,
    }
}

pub fn write_series(path: &Path, series: VolumeSeries) {
    save_nifti_to_file(path, &with_geometry(series)).unwrap();
}

pub fn approx_eq(a: &[f64], b: &[f64], tol: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tol)
}

/// How [`FakeBackend`] writes its result
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FakeOutput {
    /// `<base>.nii`, left for the pipeline to gzip
    Uncompressed,
    Gzipped,
    /// Exits cleanly without writing anything
    Nothing,
    Fail,
}

/// Stands in for NORDIC: writes the magnitude series scaled by `scale`
pub struct FakeBackend {
    pub scale: f64,
    pub output: FakeOutput,
    pub calls: Mutex<Vec<(PathBuf, PathBuf, String, NordicArgs)>>,
}

impl FakeBackend {
    pub fn new(output: FakeOutput) -> Self {
        Self {
            scale: 0.5,
            output,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl NordicBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn run(&self, magnitude: &Path, phase: &Path, output_base: &str, args: &NordicArgs) -> Result<()> {
        self.calls.lock().unwrap().push((
            magnitude.to_path_buf(),
            phase.to_path_buf(),
            output_base.to_string(),
            args.clone(),
        ));

        let ext = match self.output {
            FakeOutput::Fail => return Err(NordicError::ExternalBackendFailure {
                backend: "fake".to_string(),
                message: "simulated failure".to_string(),
            }),
            FakeOutput::Nothing => return Ok(()),
            FakeOutput::Uncompressed => "nii",
            FakeOutput::Gzipped => "nii.gz",
        };

        let input = read_nifti_file(magnitude)?;
        let scaled: Vec<f64> = input.series.as_slice().iter().map(|v| v * self.scale).collect();
        let series = VolumeSeries::new(scaled, input.series.dims(), input.series.len())?;
        let out = PathBuf::from(format!("{}{}.{}", args.dirout, output_base, ext));
        save_nifti_to_file(&out, &input.with_series(series))
    }
}

/// Minimal BIDS layout with magnitude/phase pairs and sidecars
pub struct BidsDataset {
    pub root: tempfile::TempDir,
}

impl BidsDataset {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn func_dir(&self, sub: &str, ses: &str) -> PathBuf {
        self.path().join(format!("sub-{}", sub)).join(format!("ses-{}", ses)).join("func")
    }

    /// Add `sub-<sub>_ses-<ses>_task-<task>_bold.nii.gz` (and its phase series
    /// when `with_phase`). Returns the magnitude path.
    pub fn add_run(&self, sub: &str, ses: &str, task: &str, series: &VolumeSeries, with_phase: bool) -> PathBuf {
        let dir = self.func_dir(sub, ses);
        let stem = format!("sub-{}_ses-{}_task-{}", sub, ses, task);
        let magnitude = dir.join(format!("{}_bold.nii.gz", stem));
        write_series(&magnitude, series.clone());
        std::fs::write(
            dir.join(format!("{}_bold.json", stem)),
            r#"{"RepetitionTime": 1.5, "TaskName": "rest"}"#,
        )
        .unwrap();
        if with_phase {
            write_series(&dir.join(format!("{}_part-phase_bold.nii.gz", stem)), series.clone());
        }
        magnitude
    }

    /// Output directory mirroring `func_dir`
    pub fn deriv_dir(&self, sub: &str, ses: &str) -> PathBuf {
        self.path()
            .join("derivatives")
            .join("nordic")
            .join(format!("sub-{}", sub))
            .join(format!("ses-{}", ses))
            .join("func")
    }
}
