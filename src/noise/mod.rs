//! Noise calibration scan handling
//!
//! - `detect`: flag low-variance volumes with a median/MAD threshold
//! - `split`: cut a series into a functional prefix and a noise suffix

pub mod detect;
pub mod split;

pub use detect::{detect, NoiseDetectionResult, DEFAULT_MAD_THRESH};
pub use split::{split, SplitResult};
