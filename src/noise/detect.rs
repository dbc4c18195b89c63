//! Noise-scan detection by per-volume variance
//!
//! Noise calibration scans carry no physiological signal, so their spatial
//! variance collapses far below that of the functional volumes. A volume is
//! flagged when its variance falls strictly below
//! `median_variance - mad_thresh * mad`.

use serde::Serialize;

use crate::error::{NordicError, Result};
use crate::utils::stats::{median, median_abs_deviation, population_variance};
use crate::volume::VolumeSeries;

/// Default MAD multiplier used by the command line tools
pub const DEFAULT_MAD_THRESH: f64 = 50.0;

/// Outcome of a single detection pass
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NoiseDetectionResult {
    /// Ascending indices of volumes classified as noise
    pub noise_indices: Vec<usize>,
    /// Population variance of each volume, parallel to the series axis
    pub variances: Vec<f64>,
    pub threshold: f64,
    /// Unscaled median absolute deviation of `variances`
    pub mad: f64,
    pub median_variance: f64,
}

impl NoiseDetectionResult {
    pub fn has_noise(&self) -> bool {
        !self.noise_indices.is_empty()
    }

    /// Index of the first flagged volume, where the series will be cut
    pub fn first_noise_index(&self) -> Option<usize> {
        self.noise_indices.first().copied()
    }
}

/// Classify the volumes of `series` as signal or noise.
///
/// # Arguments
/// * `series` - Volume series, at least one volume with at least one voxel
/// * `mad_thresh` - Multiplier on the MAD (conventionally 50, no range enforced)
///
/// # Returns
/// Detection result carrying every index with anomalously low variance,
/// wherever it occurs in the series. Contiguity is not assumed here.
///
/// # Errors
/// `InvalidInput` for an empty series, or when the median or MAD of the
/// variances is not finite (any NaN voxel, or infinite voxels).
pub fn detect(series: &VolumeSeries, mad_thresh: f64) -> Result<NoiseDetectionResult> {
    if series.is_empty() {
        return Err(NordicError::InvalidInput(
            "noise detection needs at least one volume".to_string(),
        ));
    }
    if series.voxels_per_volume() == 0 {
        return Err(NordicError::InvalidInput(format!(
            "volumes have no voxels (dims {:?})", series.dims()
        )));
    }

    let variances: Vec<f64> = series.volumes().map(population_variance).collect();

    let median_variance = median(&variances);
    let mad = median_abs_deviation(&variances, median_variance);
    if !median_variance.is_finite() || !mad.is_finite() {
        return Err(NordicError::InvalidInput(format!(
            "variance statistics are not finite (median={}, mad={}); check for NaN/Inf voxels",
            median_variance, mad
        )));
    }

    let threshold = median_variance - mad_thresh * mad;

    let noise_indices: Vec<usize> = variances
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v < threshold)
        .map(|(i, _)| i)
        .collect();

    log::debug!(
        "noise detection: median_variance={:.6e} mad={:.6e} threshold={:.6e} flagged={:?}",
        median_variance, mad, threshold, noise_indices
    );

    Ok(NoiseDetectionResult {
        noise_indices,
        variances,
        threshold,
        mad,
        median_variance,
    })
}
