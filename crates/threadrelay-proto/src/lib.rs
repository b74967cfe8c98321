//! Thread relay wire protocol.
//!
//! Clients talk to the relay over a persistent bidirectional connection using
//! JSON text frames shaped as `{"event": <name>, "data": <payload>}`. Inbound
//! events ask to join or leave a thread's room; outbound events carry newly
//! created messages, join acknowledgements and protocol errors.
//!
//! This crate is pure data: no I/O, no runtime. Both the server and test
//! clients encode and decode through the same types.
//!
//! # Invariants
//!
//! A [`ThreadId`] can only be constructed through [`ThreadId::parse`], so any
//! value of that type is non-empty, bounded, and free of whitespace or control
//! characters. Rooms are keyed by `ThreadId`, which means a malformed id can
//! never create a room.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod event;
mod ids;
mod message;

pub use errors::{ProtocolError, Result};
pub use event::{ClientEvent, ErrorCode, ErrorPayload, MAX_FRAME_SIZE, ServerEvent};
pub use ids::{ConnectionId, MAX_THREAD_ID_LEN, MessageId, ThreadId, UserId};
pub use message::MessageRecord;
