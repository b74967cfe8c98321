//! Storage error types.
//!
//! - `NotFound`: message refers to a thread that doesn't exist
//! - `Conflict`: message id already stored
//! - `Serialization`: fixture or record failed to encode/decode
//! - `Io`: underlying storage system errors

use thiserror::Error;
use threadrelay_proto::{MessageId, ThreadId};

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Thread not found
    #[error("thread not found: {0}")]
    NotFound(ThreadId),

    /// Message id already in use
    #[error("message already exists: {0}")]
    Conflict(MessageId),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
