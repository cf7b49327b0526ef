//! Error types for the namespace mirror.

use thiserror::Error;

/// Errors raised by a namespace source (directory listing, status lookup, change stream).
#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("Path not found in namespace: {0}")]
    NotFound(String),

    #[error("Namespace I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Change stream error: {0}")]
    Stream(String),
}

/// Main error type for mirror operations
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Path {path} does not have prefix {prefix}")]
    PrefixMismatch { path: String, prefix: String },

    #[error("Store write was not acknowledged: {0}")]
    StoreIo(String),

    #[error("Expected a directory at {0}")]
    NotADirectory(String),

    #[error("No record exists for path {0}")]
    MissingRecord(String),

    #[error("Unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event processor error: {0}")]
    Processor(String),
}

impl From<config::ConfigError> for MirrorError {
    fn from(err: config::ConfigError) -> Self {
        MirrorError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
