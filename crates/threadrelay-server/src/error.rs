//! Server error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur in the server runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable fixture, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, listener unable to accept).
    ///
    /// Fatal when raised from `bind` or `run`.
    #[error("transport error: {0}")]
    Transport(String),

    /// Storage collaborator error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
