//! Operations for model-based testing.
//!
//! Operations represent every externally visible action on the relay. They
//! are generated randomly (proptest or the fuzzer) and applied to both the
//! model and the real implementation.

use arbitrary::Arbitrary;
use threadrelay_proto::{ThreadId, UserId};

/// Client identifier: index of the connection in connect order.
pub type ClientId = u8;

/// Thread identifier (small to keep rooms crowded).
pub type ModelThreadId = u8;

/// Number of distinct users in the simulated world.
pub const NUM_USERS: u8 = 3;

/// Number of distinct threads in the simulated world.
pub const NUM_THREADS: u8 = 4;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// A new connection authenticates as `user` (taken modulo [`NUM_USERS`]).
    Connect {
        /// User the connection belongs to.
        user: u8,
    },

    /// Client asks to join a thread's room.
    Join {
        /// Client sending the request.
        client_id: ClientId,
        /// Thread to join (taken modulo [`NUM_THREADS`]).
        thread: ModelThreadId,
    },

    /// Client leaves a thread's room.
    Leave {
        /// Client sending the request.
        client_id: ClientId,
        /// Thread to leave (taken modulo [`NUM_THREADS`]).
        thread: ModelThreadId,
    },

    /// Client's connection closes.
    Disconnect {
        /// Client disconnecting.
        client_id: ClientId,
    },

    /// A new message is published to a thread.
    Publish {
        /// Target thread (taken modulo [`NUM_THREADS`]).
        thread: ModelThreadId,
    },
}

/// Outcome of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,
    /// Operation was rejected.
    Error(OperationError),
}

impl OperationResult {
    /// Whether the operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Why an operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Client id was never allocated.
    InvalidClient,
    /// Client has disconnected.
    NotConnected,
    /// Join of a thread the client's user does not own.
    NotAuthorized,
}

/// Real user id of model user `user`.
pub fn model_user_id(user: u8) -> UserId {
    UserId::new(format!("user-{}", user % NUM_USERS))
}

/// Real thread id of model thread `thread`.
#[allow(clippy::expect_used)]
pub fn model_thread_id(thread: ModelThreadId) -> ThreadId {
    ThreadId::parse(format!("thread-{}", thread % NUM_THREADS)).expect("model thread ids are valid")
}

/// Model user that owns `thread`.
pub fn thread_owner(thread: ModelThreadId) -> u8 {
    (thread % NUM_THREADS) % NUM_USERS
}
