//! Message records as produced by the storage collaborator.

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, ThreadId, UserId};

/// A persisted chat message.
///
/// The relay treats this as an opaque payload: it is created by the storage
/// layer, handed to the relay once, and forwarded verbatim to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message id assigned at creation
    pub id: MessageId,
    /// Thread the message belongs to
    pub thread_id: ThreadId,
    /// Message body
    pub content: String,
    /// Author, or `None` for messages injected by automation
    pub author_id: Option<UserId>,
    /// Creation time in Unix milliseconds (UTC)
    pub created_at: u64,
}
