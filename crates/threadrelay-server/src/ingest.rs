//! Ingestion bridge.
//!
//! The single path by which new messages enter a thread: validate, persist,
//! then hand the persisted record to the [`Publisher`] exactly once. A message
//! that failed to persist is never published.

use thiserror::Error;
use threadrelay_proto::{MessageId, MessageRecord, ThreadId, UserId};

use crate::{
    env::Environment,
    relay::Publisher,
    storage::{Storage, StorageError},
};

/// Who is creating a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOrigin {
    /// External automation authenticated by the shared incoming secret.
    /// May post to any existing thread; the record carries no author.
    Automation,
    /// A signed-in user. May only post to threads they own.
    User(UserId),
}

/// Errors from [`MessageIngest::ingest`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The thread does not exist, or is not visible to the origin.
    #[error("thread not found: {0}")]
    ThreadNotFound(ThreadId),

    /// Message content was empty or whitespace only.
    #[error("message content is empty")]
    EmptyContent,

    /// Persistence failed. Nothing was published.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Persist-then-publish bridge between the HTTP handlers and the relay.
pub struct MessageIngest<E, S, P> {
    env: E,
    storage: S,
    publisher: P,
}

impl<E, S, P> MessageIngest<E, S, P>
where
    E: Environment,
    S: Storage,
    P: Publisher,
{
    /// Create a bridge over a storage backend and a publish capability.
    pub fn new(env: E, storage: S, publisher: P) -> Self {
        Self { env, storage, publisher }
    }

    /// Check that `origin` may post `content` to `thread_id`, without
    /// writing anything.
    ///
    /// # Errors
    ///
    /// - `EmptyContent` if `content` is blank
    /// - `ThreadNotFound` if the thread is missing, or owned by someone else
    ///   when the origin is a user
    /// - `Storage` if the lookup fails
    pub fn validate(
        &self,
        thread_id: &ThreadId,
        content: &str,
        origin: &MessageOrigin,
    ) -> Result<(), IngestError> {
        if content.trim().is_empty() {
            return Err(IngestError::EmptyContent);
        }

        let thread = self
            .storage
            .find_thread(thread_id)?
            .ok_or_else(|| IngestError::ThreadNotFound(thread_id.clone()))?;

        if let MessageOrigin::User(user_id) = origin {
            if !thread.is_owned_by(user_id) {
                return Err(IngestError::ThreadNotFound(thread_id.clone()));
            }
        }

        Ok(())
    }

    /// Create a message in `thread_id` and broadcast it to the thread's room.
    ///
    /// # Errors
    ///
    /// Everything [`validate`](Self::validate) rejects, plus `Storage` if the
    /// write fails.
    pub async fn ingest(
        &self,
        thread_id: &ThreadId,
        content: &str,
        origin: MessageOrigin,
    ) -> Result<MessageRecord, IngestError> {
        self.validate(thread_id, content, &origin)?;

        let author_id = match origin {
            MessageOrigin::Automation => None,
            MessageOrigin::User(user_id) => Some(user_id),
        };

        let record = MessageRecord {
            id: MessageId::new(format!("{:032x}", self.env.random_u128())),
            thread_id: thread_id.clone(),
            content: content.to_string(),
            author_id,
            created_at: self.env.wall_clock_millis(),
        };

        if let Err(e) = self.storage.store_message(&record) {
            tracing::error!(thread_id = %thread_id, "failed to persist message: {}", e);
            return Err(e.into());
        }

        let report = self.publisher.publish(thread_id, record.clone()).await;
        tracing::info!(
            thread_id = %thread_id,
            message_id = %record.id,
            recipients = report.recipients(),
            "message ingested"
        );

        Ok(record)
    }
}
