//! Inbound and outbound relay events.
//!
//! Frames are adjacently tagged JSON objects: the `event` field names the
//! event and `data` carries its payload. Inbound frames are decoded in two
//! steps (raw strings first, then id validation) so that a well-formed frame
//! with a bad thread id is reported as [`ProtocolError::InvalidThreadId`]
//! rather than as a generic decode failure.

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    ids::ThreadId,
    message::MessageRecord,
};

/// Maximum accepted size of a single inbound frame in bytes.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Subscribe to new messages in a thread
    JoinThread(ThreadId),
    /// Stop receiving messages for a thread
    LeaveThread(ThreadId),
}

#[derive(Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum RawClientEvent {
    JoinThread(String),
    LeaveThread(String),
}

impl ClientEvent {
    /// Decode an inbound frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_SIZE });
        }

        let raw: RawClientEvent = serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

        match raw {
            RawClientEvent::JoinThread(id) => ThreadId::parse(id).map(Self::JoinThread),
            RawClientEvent::LeaveThread(id) => ThreadId::parse(id).map(Self::LeaveThread),
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }

    /// Thread the event refers to.
    pub fn thread_id(&self) -> &ThreadId {
        match self {
            Self::JoinThread(id) | Self::LeaveThread(id) => id,
        }
    }
}

/// Events sent by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A message was created in a thread the connection has joined
    Message(MessageRecord),
    /// Join request accepted
    JoinedThread(ThreadId),
    /// A request from this connection was rejected
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }

    /// Decode an outbound frame (client side).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }
}

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Thread id failed validation
    InvalidThreadId,
    /// Connection identity does not own the thread
    NotAuthorized,
    /// Frame could not be decoded
    MalformedFrame,
    /// Thread lookup failed in the storage collaborator
    StorageUnavailable,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Error category
    pub code: ErrorCode,
    /// Human-readable description
    pub message: String,
    /// Thread the rejected request referred to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
}

impl ErrorPayload {
    /// Decoding failure of a whole frame.
    pub fn from_protocol_error(error: &ProtocolError) -> Self {
        let code = match error {
            ProtocolError::InvalidThreadId(_) => ErrorCode::InvalidThreadId,
            ProtocolError::MalformedFrame(_) | ProtocolError::FrameTooLarge { .. } => {
                ErrorCode::MalformedFrame
            },
        };
        Self { code, message: error.to_string(), thread_id: None }
    }

    /// Join refused because the connection does not own the thread.
    pub fn not_authorized(thread_id: ThreadId) -> Self {
        Self {
            code: ErrorCode::NotAuthorized,
            message: format!("not authorized to join thread {thread_id}"),
            thread_id: Some(thread_id),
        }
    }

    /// Thread ownership could not be checked.
    pub fn storage_unavailable(thread_id: ThreadId, reason: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::StorageUnavailable,
            message: reason.into(),
            thread_id: Some(thread_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{MessageId, UserId};

    fn thread(raw: &str) -> ThreadId {
        ThreadId::parse(raw).unwrap()
    }

    #[test]
    fn decode_join_and_leave() {
        let join = ClientEvent::decode(br#"{"event":"joinThread","data":"t1"}"#).unwrap();
        assert_eq!(join, ClientEvent::JoinThread(thread("t1")));

        let leave = ClientEvent::decode(br#"{"event":"leaveThread","data":"t1"}"#).unwrap();
        assert_eq!(leave, ClientEvent::LeaveThread(thread("t1")));
        assert_eq!(leave.thread_id().as_str(), "t1");
    }

    #[test]
    fn decode_reports_invalid_thread_id_separately() {
        let err = ClientEvent::decode(br#"{"event":"joinThread","data":""}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidThreadId(_)));

        let payload = ErrorPayload::from_protocol_error(&err);
        assert_eq!(payload.code, ErrorCode::InvalidThreadId);
    }

    #[test]
    fn decode_rejects_unknown_event() {
        let err = ClientEvent::decode(br#"{"event":"deleteThread","data":"t1"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn decode_rejects_non_string_thread_id() {
        let err = ClientEvent::decode(br#"{"event":"joinThread","data":42}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let padding = "x".repeat(MAX_FRAME_SIZE);
        let frame = format!(r#"{{"event":"joinThread","data":"{padding}"}}"#);
        let err = ClientEvent::decode(frame.as_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[test]
    fn message_event_wire_shape() {
        let event = ServerEvent::Message(MessageRecord {
            id: MessageId::new("m1"),
            thread_id: thread("t1"),
            content: "hi".to_string(),
            author_id: Some(UserId::new("u1")),
            created_at: 1_700_000_000_000,
        });

        let json: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(json["event"], "message");
        assert_eq!(json["data"]["id"], "m1");
        assert_eq!(json["data"]["threadId"], "t1");
        assert_eq!(json["data"]["authorId"], "u1");
        assert_eq!(json["data"]["createdAt"], 1_700_000_000_000_u64);
    }

    #[test]
    fn error_event_wire_shape() {
        let event = ServerEvent::Error(ErrorPayload::not_authorized(thread("t9")));

        let json: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["code"], "NOT_AUTHORIZED");
        assert_eq!(json["data"]["threadId"], "t9");
    }

    #[test]
    fn client_event_encode_matches_decode() {
        let event = ClientEvent::JoinThread(thread("abc"));
        let text = event.encode().unwrap();
        assert_eq!(text, r#"{"event":"joinThread","data":"abc"}"#);
        assert_eq!(ClientEvent::decode(text.as_bytes()).unwrap(), event);
    }
}
