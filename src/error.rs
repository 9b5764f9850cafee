//! Error types for OptiKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::record::Version;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for OptiKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Versioning Errors
    // -------------------------------------------------------------------------
    /// The caller's expected version does not match the stored one.
    /// Recoverable by re-reading the key and retrying.
    #[error("Version conflict for key {key}: expected version {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: Version,
        actual: Version,
    },

    #[error("Invalid version {version} for key {key}: versions are non-negative")]
    InvalidVersion { key: String, version: i64 },

    // -------------------------------------------------------------------------
    // Commit Errors
    // -------------------------------------------------------------------------
    /// The durability sink rejected a batch. In-memory state is untouched.
    #[error("Commit {commit_id} failed: {source}")]
    CommitFailure {
        commit_id: u64,
        #[source]
        source: Box<KvError>,
    },

    #[error("Commit log corruption detected: {0}")]
    LogCorruption(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Build a version conflict, rendering the key for display
    pub fn conflict<K: std::fmt::Debug>(key: &K, expected: Version, actual: Version) -> Self {
        KvError::VersionConflict {
            key: format!("{:?}", key),
            expected,
            actual,
        }
    }

    /// Build an invalid-version error for a negative version argument
    pub fn invalid_version<K: std::fmt::Debug>(key: &K, version: i64) -> Self {
        KvError::InvalidVersion {
            key: format!("{:?}", key),
            version,
        }
    }

    /// Whether a caller can recover by re-reading and retrying
    pub fn is_conflict(&self) -> bool {
        matches!(self, KvError::VersionConflict { .. })
    }
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}
