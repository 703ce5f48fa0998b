//! Error types shared across Privid crates.

use std::path::PathBuf;

/// Top-level error type for Privid operations.
#[derive(Debug, thiserror::Error)]
pub enum PrividError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Aggregator error: {message}")]
    Aggregator { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Malformed raw detection file {path}: {source}")]
    RawData {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using PrividError.
pub type PrividResult<T> = Result<T, PrividError>;

impl PrividError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn aggregator(msg: impl Into<String>) -> Self {
        Self::Aggregator {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Map an I/O failure on `path` to `FileNotFound` when the file is
    /// missing, keeping every other kind as a plain I/O error.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path: path.into() }
        } else {
            Self::Io(err)
        }
    }
}
