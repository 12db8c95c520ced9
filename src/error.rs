//! Error taxonomy for the trainer, indexer, and query engine.
//!
//! Five kinds, one per failure mode the core recognizes. Nothing here is
//! recovered internally — a stage either succeeds or returns one of these
//! and the caller (the CLI) reports it and exits non-zero.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IvfadcError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("format error in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("shape error: {0}")]
    Shape(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("worker pool task failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, IvfadcError>;

impl IvfadcError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IvfadcError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IvfadcError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
