//! Robust statistics over per-volume signals
//!
//! Median and median absolute deviation (MAD) follow NumPy conventions:
//! even-length medians average the two middle values, and the MAD is left
//! unscaled (no 1.4826 normal-consistency factor). A NaN anywhere in the
//! input makes the result NaN.

use std::cmp::Ordering;

/// Median of `values`
///
/// Returns NaN for an empty slice or when any value is NaN.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let n = sorted.len();
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Unscaled median absolute deviation about a precomputed `center`
///
/// MAD = median(|x_i - center|)
pub fn median_abs_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|&v| (v - center).abs()).collect();
    median(&deviations)
}

/// Population variance (divides by N, not N-1)
///
/// Two-pass: mean first, then mean squared deviation.
/// Returns NaN for an empty slice.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n
}
