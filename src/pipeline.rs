//! NORDIC preprocessing of magnitude/phase pairs
//!
//! Per pair: detect noise scans on the magnitude series, run the NORDIC
//! backend, then split both the raw magnitude and the denoised series into
//! functional and noise partitions.
//!
//! [`run_single`] handles one pair with flat output names;
//! [`run_bids`] walks a BIDS dataset and isolates failures per pair.

use std::path::{Path, PathBuf};

use crate::backends::{NordicArgs, NordicBackend};
use crate::bids::{self, BidsFilter, DerivativePaths};
use crate::error::{NordicError, Result};
use crate::nifti_io::{gzip_nii, read_nifti_file, save_nifti_to_file, strip_nifti_extension, NiftiSeries};
use crate::noise::{detect, split, NoiseDetectionResult, DEFAULT_MAD_THRESH};

/// Detection and NORDIC parameters
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOptions {
    /// MAD multiplier for noise scan detection
    pub mad_thresh: f64,
    pub temporal_phase: i32,
    pub phase_filter_width: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mad_thresh: DEFAULT_MAD_THRESH,
            temporal_phase: 1,
            phase_filter_width: 10.0,
        }
    }
}

impl PipelineOptions {
    /// Backend arguments for a series with `noise_volumes` trailing noise scans
    pub fn nordic_args(&self, noise_volumes: usize, out_dir: &Path) -> NordicArgs {
        let mut dirout = out_dir.to_string_lossy().into_owned();
        if dirout.is_empty() {
            dirout.push('.');
        }
        if !dirout.ends_with(std::path::MAIN_SEPARATOR) {
            dirout.push(std::path::MAIN_SEPARATOR);
        }
        NordicArgs {
            temporal_phase: self.temporal_phase,
            phase_filter_width: self.phase_filter_width,
            noise_volume_last: noise_volumes,
            dirout,
        }
    }
}

/// Magnitude series with its detection result
#[derive(Clone, Debug)]
pub struct DetectedSeries {
    pub image: NiftiSeries,
    pub detection: NoiseDetectionResult,
}

/// Load `magnitude` and detect its noise scans.
pub fn load_and_detect(magnitude: &Path, mad_thresh: f64) -> Result<DetectedSeries> {
    let image = read_nifti_file(magnitude)?;
    let detection = detect(&image.series, mad_thresh)?;
    log::info!(
        "Found {} noise scans in {}: {:?}",
        detection.noise_indices.len(),
        magnitude.display(),
        detection.noise_indices
    );
    Ok(DetectedSeries { image, detection })
}

/// Find the backend's output for `base` in `out_dir`.
///
/// An uncompressed `.nii` is gzipped in place; otherwise `.nii.gz` is used.
pub fn locate_nordic_output(out_dir: &Path, base: &str) -> Result<PathBuf> {
    let nii = out_dir.join(format!("{}.nii", base));
    let nii_gz = out_dir.join(format!("{}.nii.gz", base));
    if nii.is_file() {
        gzip_nii(&nii)
    } else if nii_gz.is_file() {
        Ok(nii_gz)
    } else {
        Err(NordicError::backend(
            "nordic",
            format!("Expected NORDIC output not found at {} or {}", nii.display(), nii_gz.display()),
        ))
    }
}

/// Run the backend on one pair and return the (gzipped) denoised series path.
pub fn run_nordic(
    backend: &dyn NordicBackend,
    magnitude: &Path,
    phase: &Path,
    out_dir: &Path,
    base: &str,
    args: &NordicArgs,
) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir).map_err(|e| NordicError::io(out_dir, e))?;
    log::info!("Running NORDIC ({}) on {}", backend.name(), magnitude.display());
    backend.run(magnitude, phase, base, args)?;
    locate_nordic_output(out_dir, base)
}

/// Functional/noise partitions of the raw and denoised series, all on the
/// magnitude image's grid
#[derive(Clone, Debug)]
pub struct Partitions {
    pub functional_raw: NiftiSeries,
    pub functional_nordic: NiftiSeries,
    pub noise_raw: Option<NiftiSeries>,
    pub noise_nordic: Option<NiftiSeries>,
}

impl Partitions {
    pub fn has_noise(&self) -> bool {
        self.noise_raw.is_some()
    }
}

/// Split the raw and denoised series at the detected noise boundary.
pub fn split_pair(detected: &DetectedSeries, nordic_file: &Path) -> Result<Partitions> {
    let denoised = read_nifti_file(nordic_file)?;
    let indices = &detected.detection.noise_indices;

    let raw = split(&detected.image.series, indices)?;
    let nordic = split(&denoised.series, indices)?;

    if raw.functional.is_empty() {
        log::warn!("first volume flagged as noise; functional partition is empty");
    }

    let geometry = &detected.image;
    Ok(Partitions {
        functional_raw: geometry.with_series(raw.functional),
        functional_nordic: geometry.with_series(nordic.functional),
        noise_raw: raw.noise.map(|s| geometry.with_series(s)),
        noise_nordic: nordic.noise.map(|s| geometry.with_series(s)),
    })
}

/// Output naming for [`run_single`]
#[derive(Clone, Debug)]
pub struct SingleRunOptions {
    /// Defaults to the magnitude image's directory
    pub output_dir: Option<PathBuf>,
    /// Prefix of the NORDIC output base name
    pub output_prefix: String,
    pub pipeline: PipelineOptions,
}

impl Default for SingleRunOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            output_prefix: "NORDIC_".to_string(),
            pipeline: PipelineOptions::default(),
        }
    }
}

/// Directory containing `magnitude`; `.` for a bare file name
pub fn default_output_dir(magnitude: &Path) -> PathBuf {
    magnitude
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// What [`run_single`] produced
#[derive(Clone, Debug)]
pub struct SingleRunReport {
    pub detection: NoiseDetectionResult,
    /// Full denoised series, kept on disk
    pub nordic_file: PathBuf,
    pub written: Vec<PathBuf>,
}

/// Process one magnitude/phase pair.
///
/// Writes `functional_data_{raw,nordic}.nii.gz` and
/// `noise_data_{raw,nordic}.nii.gz` to the output directory, or only
/// `functional_data_nordic.nii.gz` when no noise scans were found.
pub fn run_single(
    backend: &dyn NordicBackend,
    magnitude: &Path,
    phase: &Path,
    options: &SingleRunOptions,
) -> Result<SingleRunReport> {
    let out_dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => default_output_dir(magnitude),
    };
    let file_name = magnitude
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = format!("{}{}", options.output_prefix, strip_nifti_extension(&file_name));

    let detected = load_and_detect(magnitude, options.pipeline.mad_thresh)?;
    let args = options
        .pipeline
        .nordic_args(detected.detection.noise_indices.len(), &out_dir);
    let nordic_file = run_nordic(backend, magnitude, phase, &out_dir, &base, &args)?;

    let parts = split_pair(&detected, &nordic_file)?;

    let mut written = Vec::new();
    let mut save = |image: &NiftiSeries, name: &str| -> Result<()> {
        let path = out_dir.join(name);
        save_nifti_to_file(&path, image)?;
        written.push(path);
        Ok(())
    };

    match (&parts.noise_raw, &parts.noise_nordic) {
        (Some(noise_raw), Some(noise_nordic)) => {
            save(&parts.functional_raw, "functional_data_raw.nii.gz")?;
            save(&parts.functional_nordic, "functional_data_nordic.nii.gz")?;
            save(noise_raw, "noise_data_raw.nii.gz")?;
            save(noise_nordic, "noise_data_nordic.nii.gz")?;
        }
        _ => {
            log::info!("No noise scans detected; writing only the NORDIC functional series");
            save(&parts.functional_nordic, "functional_data_nordic.nii.gz")?;
        }
    }

    Ok(SingleRunReport {
        detection: detected.detection,
        nordic_file,
        written,
    })
}

/// Dataset-level options for [`run_bids`]
#[derive(Clone, Debug, Default)]
pub struct BidsRunOptions {
    pub filter: BidsFilter,
    pub overwrite: bool,
    pub pipeline: PipelineOptions,
}

/// Final state of one magnitude series in a BIDS run
#[derive(Debug)]
pub enum PairOutcome {
    Processed { noise_volumes: usize },
    /// All expected outputs already present
    SkippedExisting,
    /// No `_part-phase_bold` counterpart next to the magnitude series
    SkippedMissingPhase,
    Failed(NordicError),
}

/// Per-file outcomes of a BIDS run
#[derive(Debug, Default)]
pub struct BidsRunSummary {
    pub outcomes: Vec<(PathBuf, PairOutcome)>,
}

impl BidsRunSummary {
    fn count(&self, pred: impl Fn(&PairOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::SkippedExisting | PairOutcome::SkippedMissingPhase))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Failed(_)))
    }
}

/// Process every magnitude/phase pair in a BIDS dataset.
///
/// A failure on one pair is logged and recorded; the remaining pairs are
/// still processed. Only problems with the dataset root itself abort the run.
pub fn run_bids(backend: &dyn NordicBackend, bids_root: &Path, options: &BidsRunOptions) -> Result<BidsRunSummary> {
    let deriv_root = bids::derivatives_root(bids_root);
    bids::write_dataset_description(&deriv_root)?;

    let func_files = bids::find_func_files(bids_root, &options.filter)?;
    let mut summary = BidsRunSummary::default();

    if func_files.is_empty() {
        log::warn!("No functional files found matching: sub-*/ses-*/func/*_bold.nii.gz");
        return Ok(summary);
    }

    for magnitude in func_files {
        let outcome = match process_bids_pair(backend, bids_root, &magnitude, options) {
            Ok(outcome) => outcome,
            Err(NordicError::MissingCounterpart(path)) => {
                log::warn!("Skipping {}, no phase file found", path.display());
                PairOutcome::SkippedMissingPhase
            }
            Err(e) => {
                log::error!("Failed {}: {}", magnitude.display(), e);
                PairOutcome::Failed(e)
            }
        };
        summary.outcomes.push((magnitude, outcome));
    }

    log::info!(
        "BIDS run finished: {} processed, {} skipped, {} failed",
        summary.processed(),
        summary.skipped(),
        summary.failed()
    );
    Ok(summary)
}

fn process_bids_pair(
    backend: &dyn NordicBackend,
    bids_root: &Path,
    magnitude: &Path,
    options: &BidsRunOptions,
) -> Result<PairOutcome> {
    let phase = bids::find_phase_counterpart(magnitude)?;
    let paths = DerivativePaths::for_magnitude(bids_root, magnitude)?;

    let detected = load_and_detect(magnitude, options.pipeline.mad_thresh)?;
    let noise_volumes = detected.detection.noise_indices.len();

    if !options.overwrite && paths.outputs_exist(detected.detection.has_noise()) {
        log::info!("Skipping {}, outputs already exist.", magnitude.display());
        return Ok(PairOutcome::SkippedExisting);
    }

    let args = options.pipeline.nordic_args(noise_volumes, &paths.out_dir);
    let nordic_file = run_nordic(backend, magnitude, &phase, &paths.out_dir, &paths.base, &args)?;

    let parts = split_pair(&detected, &nordic_file);
    // The full denoised series is not kept as a derivative
    if let Err(e) = std::fs::remove_file(&nordic_file) {
        log::warn!("Could not remove {}: {}", nordic_file.display(), e);
    }
    let parts = parts?;

    let source_json = bids::sidecar_path(magnitude);
    match (&parts.noise_raw, &parts.noise_nordic) {
        (Some(noise_raw), Some(noise_nordic)) => {
            bids::save_with_sidecar(&parts.functional_raw, &paths.functional_raw(), &source_json,
                "Functional volumes (noise removed, raw)")?;
            bids::save_with_sidecar(&parts.functional_nordic, &paths.functional_nordic(), &source_json,
                "Functional volumes (noise removed, NORDIC denoised)")?;
            bids::save_with_sidecar(noise_raw, &paths.noise_raw(), &source_json,
                "Noise volumes (raw, split by variance threshold)")?;
            bids::save_with_sidecar(noise_nordic, &paths.noise_nordic(), &source_json,
                "Noise volumes (NORDIC denoised)")?;
        }
        _ => {
            log::info!("No noise scans detected for {}", magnitude.display());
            bids::save_with_sidecar(&parts.functional_nordic, &paths.functional_nordic(), &source_json,
                "Functional volumes (NORDIC denoised, no noise scans detected)")?;
        }
    }

    Ok(PairOutcome::Processed { noise_volumes })
}
