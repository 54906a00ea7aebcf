//! Error types for refresh operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while rebuilding derived tables.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Malformed rank configuration or settings. Raised before any table is touched.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Duplicate key detected while building a unique index.
    #[error("constraint violation in table {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    /// Any other failure reported by the store.
    #[error("database error: {0}")]
    Execution(#[from] rusqlite::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Importance dataset present but unusable.
    #[error("malformed importance dataset: {0}")]
    Dataset(String),

    /// A place row whose stored fields cannot be interpreted.
    #[error("invalid place record {place_id}: {message}")]
    InvalidRecord { place_id: i64, message: String },
}

impl RefreshError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify a failure from building the index of `table`.
    pub(crate) fn from_index_build(table: &str, err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            Self::ConstraintViolation {
                table: table.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Execution(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, RefreshError>;
