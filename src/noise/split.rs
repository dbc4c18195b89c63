//! Functional/noise partition of a volume series
//!
//! Noise calibration scans are acquired as a contiguous run at the end of the
//! series, so the partition is a single cut at the first flagged volume:
//! everything before it is functional, everything from it onward is noise.
//! Membership of later volumes in the index set is not consulted.

use crate::error::{NordicError, Result};
use crate::volume::VolumeSeries;

/// The two halves of a split series
#[derive(Clone, Debug, PartialEq)]
pub struct SplitResult {
    /// Contiguous prefix `series[0..k]`
    pub functional: VolumeSeries,
    /// Contiguous suffix `series[k..]`, absent when no noise index was given
    pub noise: Option<VolumeSeries>,
}

impl SplitResult {
    pub fn has_noise(&self) -> bool {
        self.noise.is_some()
    }
}

/// Cut `series` at the first entry of `noise_indices`.
///
/// # Arguments
/// * `series` - Series to partition (not modified)
/// * `noise_indices` - Ascending noise indices, typically from
///   [`detect`](super::detect::detect)
///
/// # Errors
/// `IndexOutOfRange` if any index is `>= series.len()`.
pub fn split(series: &VolumeSeries, noise_indices: &[usize]) -> Result<SplitResult> {
    if let Some(&index) = noise_indices.iter().find(|&&i| i >= series.len()) {
        return Err(NordicError::IndexOutOfRange { index, len: series.len() });
    }

    let Some(&cut) = noise_indices.first() else {
        return Ok(SplitResult {
            functional: series.clone(),
            noise: None,
        });
    };

    Ok(SplitResult {
        functional: series.slice_volumes(0..cut)?,
        noise: Some(series.slice_volumes(cut..series.len())?),
    })
}
