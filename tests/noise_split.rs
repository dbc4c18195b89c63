//! Noise detection and splitting on synthetic series

mod common;

use nordic_core::nifti_io::read_nifti_file;
use nordic_core::noise::{detect, split};
use nordic_core::{NordicError, VolumeSeries};
use proptest::prelude::*;

use common::{synthetic_series, write_series};

const DIMS: (usize, usize, usize) = (20, 20, 20);

#[test]
fn test_trailing_noise_scans_detected() {
    let series = synthetic_series(DIMS, 10, 7, 42);
    let result = detect(&series, 10.0).unwrap();

    assert_eq!(result.first_noise_index(), Some(7));
    assert_eq!(result.noise_indices, vec![7, 8, 9]);
    for (t, v) in result.variances.iter().enumerate() {
        if t < 7 {
            assert!(*v > 0.8 && *v < 1.2, "volume {} variance {}", t, v);
        } else {
            assert!(*v < 0.01, "volume {} variance {}", t, v);
        }
    }
}

#[test]
fn test_detect_then_split() {
    let series = synthetic_series(DIMS, 10, 7, 7);
    let result = detect(&series, 10.0).unwrap();
    let parts = split(&series, &result.noise_indices).unwrap();

    let noise = parts.noise.expect("noise partition");
    assert_eq!(parts.functional.len(), 7);
    assert_eq!(noise.len(), 3);
    assert_eq!(parts.functional.as_slice(), series.slice_volumes(0..7).unwrap().as_slice());
    assert_eq!(noise.as_slice(), series.slice_volumes(7..10).unwrap().as_slice());
}

#[test]
fn test_no_noise_scans() {
    let series = synthetic_series(DIMS, 8, 8, 3);
    let result = detect(&series, 10.0).unwrap();
    assert!(!result.has_noise());

    let parts = split(&series, &result.noise_indices).unwrap();
    assert!(parts.noise.is_none());
    assert_eq!(parts.functional, series);
}

#[test]
fn test_detect_and_split_deterministic() {
    let series = synthetic_series(DIMS, 10, 7, 11);
    let a = detect(&series, 10.0).unwrap();
    let b = detect(&series, 10.0).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        split(&series, &a.noise_indices).unwrap().functional,
        split(&series, &b.noise_indices).unwrap().functional
    );
}

#[test]
fn test_detection_from_nifti_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bold.nii.gz");
    write_series(&path, synthetic_series((16, 16, 16), 12, 9, 5));

    let image = read_nifti_file(&path).unwrap();
    assert_eq!(image.series.len(), 12);
    assert_eq!(image.repetition_time, 1.5);

    let result = detect(&image.series, 10.0).unwrap();
    assert_eq!(result.first_noise_index(), Some(9));
}

#[test]
fn test_split_rejects_foreign_indices() {
    let series = synthetic_series((4, 4, 4), 5, 5, 1);
    match split(&series, &[3, 5]) {
        Err(NordicError::IndexOutOfRange { index, len }) => {
            assert_eq!(index, 5);
            assert_eq!(len, 5);
        }
        other => panic!("expected IndexOutOfRange, got {:?}", other),
    }
}

/// Volume `t` alternates `+a[t]` / `-a[t]`, so its variance is exactly `a[t]^2`
fn alternating_series(amplitudes: &[f64]) -> VolumeSeries {
    let vols: Vec<Vec<f64>> = amplitudes.iter().map(|&a| vec![a, -a, a, -a]).collect();
    VolumeSeries::from_volumes((2, 2, 1), &vols).unwrap()
}

/// Median with even-length averaging
fn reference_median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn labelled_series(n: usize) -> VolumeSeries {
    VolumeSeries::from_fn((2, 3, 1), n, |i, j, _, t| (t * 100 + j * 2 + i) as f64)
}

proptest! {
    #[test]
    fn prop_split_partitions_recombine(n in 1usize..16, cut_frac in 0.0f64..1.0) {
        let cut = ((n as f64) * cut_frac) as usize;
        let series = labelled_series(n);
        let indices: Vec<usize> = (cut..n).collect();

        let parts = split(&series, &indices).unwrap();
        prop_assert_eq!(parts.functional.len(), cut);
        let noise = parts.noise.expect("non-empty indices give a noise partition");
        prop_assert_eq!(noise.len(), n - cut);
        prop_assert_eq!(parts.functional.concat(&noise).unwrap(), series);
    }

    #[test]
    fn prop_noise_indices_below_threshold(values in prop::collection::vec(0.0f64..10.0, 1..12)) {
        // one volume per value, scaled so its variance is value^2 / 4
        let vols: Vec<Vec<f64>> = values.iter().map(|v| vec![0.0, *v, 0.0, *v]).collect();
        let series = VolumeSeries::from_volumes((2, 2, 1), &vols).unwrap();
        let result = detect(&series, 1.0).unwrap();

        for (t, var) in result.variances.iter().enumerate() {
            prop_assert_eq!(result.noise_indices.contains(&t), *var < result.threshold);
        }
    }

    #[test]
    fn prop_zero_thresh_flags_below_median(amplitudes in prop::collection::vec(0.0f64..100.0, 1..16)) {
        let series = alternating_series(&amplitudes);
        let result = detect(&series, 0.0).unwrap();

        let variances: Vec<f64> = amplitudes.iter().map(|a| a * a).collect();
        let med = reference_median(&variances);
        let expected: Vec<usize> = (0..variances.len()).filter(|&i| variances[i] < med).collect();
        prop_assert_eq!(result.noise_indices, expected);
    }

    #[test]
    fn prop_constant_variance_has_no_noise(
        amplitude in 0.0f64..1000.0,
        n in 1usize..20,
        mad_thresh in 0.0f64..1000.0,
    ) {
        let series = alternating_series(&vec![amplitude; n]);
        let result = detect(&series, mad_thresh).unwrap();
        prop_assert!(result.noise_indices.is_empty());
        prop_assert_eq!(result.mad, 0.0);
    }
}
