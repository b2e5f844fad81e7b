//! Error taxonomy for dataset operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by dataset handles and the concat/split drivers.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The source directory does not exist.
    #[error("dataset not found at {}", .path.display())]
    NotFound { path: PathBuf },

    /// The path exists but does not hold a structurally valid dataset.
    #[error("invalid dataset at {}: {}", .path.display(), .reason)]
    Format { path: PathBuf, reason: String },

    /// The destination path is already occupied.
    #[error("destination {} already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    /// A slice request falls outside the pre-allocated array, or the
    /// requested range is empty or inverted.
    #[error("invalid range [{start}, {end}) for {array} array of {len} records")]
    OutOfBounds {
        array: &'static str,
        start: u64,
        end: u64,
        len: u64,
    },

    /// The split specification is malformed.
    #[error("invalid split config: {0}")]
    Config(String),

    /// The requested split budgets leave no scenes for the remainder.
    #[error("requested splits cover {requested} scenes but only {available} are available")]
    Overflow { requested: u64, available: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    pub(crate) fn format(path: &Path, reason: impl Into<String>) -> Self {
        DatasetError::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Per-source failures a best-effort aggregate operation may skip.
    ///
    /// Everything else (capacity, config, I/O) indicates a bug or an
    /// environment problem and must abort the whole operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DatasetError::NotFound { .. } | DatasetError::Format { .. }
        )
    }
}
