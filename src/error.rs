//! Error type shared by the detection core, NIfTI I/O, backends and the
//! dataset orchestration layer.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NordicError {
    /// Empty series, or data too non-finite for median/MAD to mean anything
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Noise index {index} out of range for series of {len} volumes")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("NORDIC backend '{backend}' failed: {message}")]
    ExternalBackendFailure { backend: String, message: String },

    #[error("No phase counterpart found for {}", .0.display())]
    MissingCounterpart(PathBuf),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("NIfTI error: {0}")]
    Nifti(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NordicError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NordicError::Io { path: path.into(), source }
    }

    pub(crate) fn backend(backend: &str, message: impl Into<String>) -> Self {
        NordicError::ExternalBackendFailure {
            backend: backend.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NordicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_out_of_range_message() {
        let err = NordicError::IndexOutOfRange { index: 7, len: 5 };
        assert_eq!(err.to_string(), "Noise index 7 out of range for series of 5 volumes");
    }

    #[test]
    fn test_missing_counterpart_names_file() {
        let err = NordicError::MissingCounterpart(PathBuf::from("/data/sub-01_bold.nii.gz"));
        assert!(err.to_string().contains("sub-01_bold.nii.gz"));
    }
}
