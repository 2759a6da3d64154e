//! Error types for the loader
//!
//! File-level errors (a bad source file, a rejected bulk load, a failed
//! statement) are caught by the batch driver and recorded against the file.
//! Everything else is fatal and ends the run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Error types for extraction, transformation and loading
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Missing field '{field}' in {path} line {line}")]
    MissingField {
        path: PathBuf,
        line: usize,
        field: &'static str,
    },

    #[error("Invalid field '{field}' in {path} line {line}: {message}")]
    InvalidField {
        path: PathBuf,
        line: usize,
        field: &'static str,
        message: String,
    },

    #[error("No records in {path}")]
    EmptyFile { path: PathBuf },

    #[error("Duplicate key loading into {table}: {detail}")]
    KeyCollision { table: String, detail: String },

    #[error("Foreign key violation loading into {table}: {detail}")]
    ForeignKey { table: String, detail: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] sparkify_common::SparkifyError),

    /// The session could not be returned to a clean state after a failed
    /// file; later files cannot be trusted to load correctly.
    #[error("Rollback failed after error in {path}: {message}")]
    Rollback { path: PathBuf, message: String },
}

/// Category of a per-file failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    /// Malformed JSON or a missing/invalid field
    Parse,
    /// A bulk load rejected for duplicate keys
    KeyCollision,
    /// Any other engine-level failure while loading the file
    Storage,
}

impl FileErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileErrorKind::Parse => "parse",
            FileErrorKind::KeyCollision => "key_collision",
            FileErrorKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EtlError {
    /// Classify an error raised while processing one file.
    ///
    /// Returns `None` for fatal errors that must terminate the run.
    pub fn file_error_kind(&self) -> Option<FileErrorKind> {
        match self {
            EtlError::Parse { .. }
            | EtlError::MissingField { .. }
            | EtlError::InvalidField { .. }
            | EtlError::EmptyFile { .. }
            | EtlError::Io(_) => Some(FileErrorKind::Parse),
            EtlError::KeyCollision { .. } => Some(FileErrorKind::KeyCollision),
            EtlError::ForeignKey { .. } | EtlError::Storage(_) => Some(FileErrorKind::Storage),
            EtlError::Database(err) => match err {
                sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => None,
                _ => Some(FileErrorKind::Storage),
            },
            EtlError::Migration(_) | EtlError::Config(_) | EtlError::Rollback { .. } => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.file_error_kind().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_level_classification() {
        let parse = EtlError::Parse {
            path: PathBuf::from("a.json"),
            line: 3,
            message: "expected value".to_string(),
        };
        assert_eq!(parse.file_error_kind(), Some(FileErrorKind::Parse));

        let collision = EtlError::KeyCollision {
            table: "songplays".to_string(),
            detail: "dup".to_string(),
        };
        assert_eq!(collision.file_error_kind(), Some(FileErrorKind::KeyCollision));
        assert!(!collision.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EtlError::Database(sqlx::Error::PoolClosed).is_fatal());
        assert!(EtlError::Rollback {
            path: PathBuf::from("a.json"),
            message: "connection reset".to_string(),
        }
        .is_fatal());
        assert!(!EtlError::Database(sqlx::Error::RowNotFound).is_fatal());
        assert!(EtlError::from(sparkify_common::SparkifyError::config("bad url")).is_fatal());
    }
}
