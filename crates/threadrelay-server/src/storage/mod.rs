//! Storage abstraction for threads, sessions, and messages.
//!
//! The relay does not own message persistence. This trait is the contract it
//! expects from the external data store: session lookup for authenticating
//! connections, thread lookup for authorizing joins, and message creation for
//! the ingestion bridge. The trait is synchronous to keep the driver free of
//! async code.

mod chaotic;
mod error;
mod fixture;
mod memory;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use fixture::{Fixture, FixtureSession};
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};
use threadrelay_proto::{MessageRecord, ThreadId, UserId};

/// A conversation thread as known to the data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredThread {
    /// Thread id (also the relay room id)
    pub id: ThreadId,
    /// Owning user. Only this user may read the thread or join its room
    pub author_id: UserId,
    /// Display title
    #[serde(default)]
    pub title: String,
}

impl StoredThread {
    /// Whether `user_id` owns this thread.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.author_id == user_id
    }
}

/// Storage abstraction for the relay's external collaborators.
///
/// Must be Clone (shared between the driver, the ingestion bridge and HTTP
/// handlers), Send + Sync, and synchronous. Implementations share internal
/// state via Arc, so clones access the same underlying store.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Resolve a session token to the authenticated user.
    ///
    /// Returns `None` for unknown or revoked tokens.
    fn find_session(&self, token: &str) -> Result<Option<UserId>, StorageError>;

    /// Register a session token for a user. Overwrites an existing token.
    fn create_session(&self, token: &str, user_id: &UserId) -> Result<(), StorageError>;

    /// Look up a thread by id.
    fn find_thread(&self, thread_id: &ThreadId) -> Result<Option<StoredThread>, StorageError>;

    /// Create a thread.
    ///
    /// Idempotent - if the thread already exists, this is a no-op (does not
    /// update the owner).
    fn create_thread(&self, thread: &StoredThread) -> Result<(), StorageError>;

    /// All threads owned by `user_id`, ordered by thread id.
    fn list_threads(&self, user_id: &UserId) -> Result<Vec<StoredThread>, StorageError>;

    /// Persist a message.
    ///
    /// # Invariants
    ///
    /// - Pre: the message's thread exists, otherwise `NotFound`
    /// - Pre: the message id is unused, otherwise `Conflict`
    /// - Post: the message is returned by `load_messages` after all messages
    ///   stored before it
    fn store_message(&self, message: &MessageRecord) -> Result<(), StorageError>;

    /// All messages of a thread in creation order.
    ///
    /// Returns an empty list for a thread without messages.
    fn load_messages(&self, thread_id: &ThreadId) -> Result<Vec<MessageRecord>, StorageError>;
}
