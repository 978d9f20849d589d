//! Error types for hoard_core.
//!
//! Only source-level failures live here. Per-row rejections during a catalog
//! walk are reported as [`crate::RowSkip`] values, never as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using hoard_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading sources or rewriting a save store.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Container file (archive or save store) is corrupted or invalid.
    #[error("Corrupted container at {path}: {reason}")]
    CorruptedContainer { path: PathBuf, reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Database source is structurally unreadable.
    #[error("Invalid database at {path}: {reason}")]
    InvalidDatabase { path: PathBuf, reason: String },

    /// Resource blob could not be decoded.
    #[error("Invalid resource: {reason}")]
    InvalidResource { reason: String },

    /// Resource had a different type than the caller asked for.
    #[error("Invalid resource type: expected {expected}, got {got}")]
    InvalidResourceType { expected: String, got: String },

    /// Object not found in a store.
    #[error("Object not found: {hash}")]
    ObjectNotFound { hash: String },

    /// Save store is invalid or has no usable root.
    #[error("Invalid save store at {path}: {reason}")]
    InvalidSave { path: PathBuf, reason: String },

    /// Configuration file could not be parsed.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Compression or decompression failed.
    #[error("Compression error: {reason}")]
    Compression { reason: String },
}

impl Error {
    /// Create a CorruptedContainer error.
    pub fn corrupted_container(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedContainer {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidDatabase error.
    pub fn invalid_database(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidDatabase {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidResource error.
    pub fn invalid_resource(reason: impl Into<String>) -> Self {
        Error::InvalidResource {
            reason: reason.into(),
        }
    }

    /// Create an InvalidResourceType error.
    pub fn invalid_resource_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::InvalidResourceType {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(hash: impl Into<String>) -> Self {
        Error::ObjectNotFound { hash: hash.into() }
    }

    /// Create an InvalidSave error.
    pub fn invalid_save(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a Compression error.
    pub fn compression_error(reason: impl Into<String>) -> Self {
        Error::Compression {
            reason: reason.into(),
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
