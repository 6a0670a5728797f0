//! Error types for the store subsystem.
//!
//! Any of these raised while persisting a record aborts a run; the same
//! errors raised while reading during aggregation only skip the file.

use std::path::Path;
use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File or directory involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File contents are not the expected JSON
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Key file in a format that cannot be loaded
    #[error("unsupported key file {path}: {reason}")]
    UnsupportedFormat {
        /// File involved
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Directory traversal failure
    #[error("failed to walk raw store: {0}")]
    Walk(#[from] walkdir::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = StoreError::io(Path::new("/data/raw"))(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.to_string(), "I/O error at /data/raw: denied");
    }
}
