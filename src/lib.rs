//! NORDIC-core: noise scan detection and NORDIC denoising orchestration
//!
//! Trailing noise scans in a 4D fMRI series are flagged by their
//! per-volume variance, NORDIC is run through an external MATLAB
//! backend, and both the raw and denoised series are split into
//! functional and noise partitions.
//!
//! # Modules
//! - `volume`: 4D series storage and volume-axis slicing
//! - `noise`: MAD-based noise scan detection and series splitting
//! - `nifti_io`: NIfTI reading and writing (gzip aware)
//! - `backends`: MATLAB session and compiled-runtime NORDIC runners
//! - `bids`: BIDS traversal, derivative naming and JSON sidecars
//! - `pipeline`: single-pair and dataset-level processing
//! - `cli`: argument structs shared by the binaries
//! - `utils`: robust statistics

pub mod error;
pub mod volume;

// Algorithm modules
pub mod noise;
pub mod utils;

// I/O modules
pub mod nifti_io;
pub mod bids;

// Orchestration
pub mod backends;
pub mod pipeline;
pub mod cli;

pub use error::{NordicError, Result};
pub use volume::VolumeSeries;
