//! Utility functions

pub mod stats;

pub use stats::{median, median_abs_deviation, population_variance};
