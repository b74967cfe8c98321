//! JSON seed data for development and tests.
//!
//! A fixture lists sessions, threads and messages to load into a fresh store,
//! standing in for the external data store when the relay runs on its own.
//!
//! ```json
//! {
//!   "sessions": [{ "token": "dev-alice", "userId": "alice" }],
//!   "threads": [{ "id": "t1", "authorId": "alice", "title": "Hello" }],
//!   "messages": []
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use threadrelay_proto::{MessageRecord, UserId};

use super::{Storage, StorageError, StoredThread};

/// Session token bound to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureSession {
    /// Bearer token presented by clients
    pub token: String,
    /// User the token authenticates
    pub user_id: UserId,
}

/// Seed data loaded into storage at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Session tokens
    #[serde(default)]
    pub sessions: Vec<FixtureSession>,
    /// Threads
    #[serde(default)]
    pub threads: Vec<StoredThread>,
    /// Messages (threads must be listed above)
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

impl Fixture {
    /// Parse a fixture from JSON text.
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a fixture file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load every entry into `storage`. Threads are created before messages.
    pub fn apply<S: Storage>(&self, storage: &S) -> Result<(), StorageError> {
        for session in &self.sessions {
            storage.create_session(&session.token, &session.user_id)?;
        }
        for thread in &self.threads {
            storage.create_thread(thread)?;
        }
        for message in &self.messages {
            storage.store_message(message)?;
        }

        tracing::info!(
            sessions = self.sessions.len(),
            threads = self.threads.len(),
            messages = self.messages.len(),
            "fixture loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use threadrelay_proto::ThreadId;

    use super::*;
    use crate::storage::MemoryStorage;

    const FIXTURE: &str = r#"{
        "sessions": [{ "token": "dev-alice", "userId": "alice" }],
        "threads": [{ "id": "t1", "authorId": "alice", "title": "Hello" }],
        "messages": [{
            "id": "m1", "threadId": "t1", "content": "hi",
            "authorId": null, "createdAt": 1
        }]
    }"#;

    #[test]
    fn apply_loads_everything() {
        let storage = MemoryStorage::new();
        Fixture::from_json(FIXTURE).unwrap().apply(&storage).unwrap();

        assert_eq!(storage.find_session("dev-alice").unwrap(), Some(UserId::new("alice")));
        assert_eq!(storage.thread_count(), 1);
        assert_eq!(storage.load_messages(&ThreadId::parse("t1").unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let fixture = Fixture::from_json("{}").unwrap();
        assert_eq!(fixture, Fixture::default());
    }

    #[test]
    fn invalid_thread_id_is_a_serialization_error() {
        let result = Fixture::from_json(r#"{"threads":[{"id":"","authorId":"a"}]}"#);
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[test]
    fn from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let fixture = Fixture::from_path(file.path()).unwrap();
        assert_eq!(fixture.sessions.len(), 1);

        let missing = Fixture::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(StorageError::Io(_))));
    }
}
