//! Protocol error types.

use thiserror::Error;

/// Errors raised while parsing identifiers or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Thread id failed validation (empty, too long, or bad characters).
    ///
    /// The connection stays open; the request that carried the id is
    /// rejected and no room is created.
    #[error("invalid thread id: {0}")]
    InvalidThreadId(String),

    /// Frame is not valid JSON or names an unknown event.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame exceeds [`MAX_FRAME_SIZE`](crate::MAX_FRAME_SIZE).
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the rejected frame
        size: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
