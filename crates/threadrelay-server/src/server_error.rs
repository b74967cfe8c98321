//! Driver error types.
//!
//! Only conditions the caller must act on surface as errors. Everything a
//! client can cause by sending a bad request (invalid thread id, unauthorized
//! join, storage hiccup during a join) is answered with a protocol `error`
//! event instead and never reaches this type.

use thiserror::Error;
use threadrelay_proto::ConnectionId;

/// Errors that can occur during driver operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Connection not found in registry.
    ///
    /// An event arrived for a connection that was already torn down. Benign
    /// when it races with a disconnect.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection limit reached.
    ///
    /// The new connection is refused; existing connections are unaffected.
    #[error("connection limit reached ({limit})")]
    ConnectionLimitReached {
        /// Configured maximum
        limit: usize,
    },
}
