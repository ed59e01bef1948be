//! Centralized error types for mboxArchive.

use std::path::PathBuf;
use thiserror::Error;

/// Store-level errors. Any of these returned while acquiring a session is
/// fatal for the folder being processed.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The source folder does not exist or is not a maildir.
    #[error("Maildir folder not found: {0}")]
    SourceNotFound(PathBuf),

    /// The backup file does not appear to be a valid MBOX.
    #[error("Backup does not appear to be a valid MBOX: {0}")]
    InvalidMbox(PathBuf),

    /// Another process holds the backup lock.
    #[error("Backup is locked by another process: {0}")]
    Locked(PathBuf),

    /// The advisory lock could not be taken or released.
    #[error("Cannot lock backup '{path}': {source}")]
    Lock {
        path: PathBuf,
        source: advisory_lock::FileLockError,
    },

    /// Compressing or decompressing the backup failed.
    #[error("Compression error on '{path}': {source}")]
    Compression {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The operator interrupted the run.
    #[error("Operation cancelled by user")]
    Cancelled,
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Problems with a single source message. These are recorded and the pass
/// moves on to the next key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The message could not be read or has no usable header block.
    #[error("cannot fetch message: {reason}")]
    Fetch { reason: String },

    /// The `Date` header is missing or unparseable, even after repair.
    #[error("cannot parse date '{value}'")]
    Date { value: String },
}

impl MessageError {
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::Fetch {
            reason: reason.into(),
        }
    }
}
