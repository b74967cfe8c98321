#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use threadrelay_proto::{MessageId, MessageRecord, ThreadId, UserId};

use super::{Storage, StorageError, StoredThread};

/// In-memory storage implementation for development, testing and simulation
///
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent access.
/// Uses `lock().expect()` which will panic if the mutex is poisoned. All
/// operations are O(1) except `load_messages` which is O(messages in thread).
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// Session token -> user
    sessions: HashMap<String, UserId>,

    /// Thread metadata (owner, title)
    threads: HashMap<ThreadId, StoredThread>,

    /// Messages organized by thread, in insertion order
    messages: HashMap<ThreadId, Vec<MessageRecord>>,

    /// All message ids ever stored, for conflict detection
    message_ids: HashSet<MessageId>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStorageInner::default())) }
    }

    /// Total number of messages across all threads.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn message_count(&self) -> usize {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner.messages.values().map(Vec::len).sum()
    }

    /// Number of known threads.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn thread_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").threads.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn find_session(&self, token: &str) -> Result<Option<UserId>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.sessions.get(token).cloned())
    }

    #[allow(clippy::expect_used)]
    fn create_session(&self, token: &str, user_id: &UserId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.sessions.insert(token.to_string(), user_id.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn find_thread(&self, thread_id: &ThreadId) -> Result<Option<StoredThread>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.threads.get(thread_id).cloned())
    }

    #[allow(clippy::expect_used)]
    fn create_thread(&self, thread: &StoredThread) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.threads.entry(thread.id.clone()).or_insert_with(|| thread.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn list_threads(&self, user_id: &UserId) -> Result<Vec<StoredThread>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        let mut owned: Vec<_> =
            inner.threads.values().filter(|t| t.is_owned_by(user_id)).cloned().collect();
        owned.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(owned)
    }

    #[allow(clippy::expect_used)]
    fn store_message(&self, message: &MessageRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if !inner.threads.contains_key(&message.thread_id) {
            return Err(StorageError::NotFound(message.thread_id.clone()));
        }

        if !inner.message_ids.insert(message.id.clone()) {
            return Err(StorageError::Conflict(message.id.clone()));
        }

        inner.messages.entry(message.thread_id.clone()).or_default().push(message.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_messages(&self, thread_id: &ThreadId) -> Result<Vec<MessageRecord>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.messages.get(thread_id).cloned().unwrap_or_default())
    }
}
