//! Fuzz target for ClientEvent::decode
//!
//! Arbitrary bytes from an untrusted socket. Decoding must never panic, and
//! anything that decodes must carry a valid thread id that re-encodes to an
//! equivalent event.

#![no_main]

use libfuzzer_sys::fuzz_target;
use threadrelay_proto::{ClientEvent, ThreadId};

fuzz_target!(|data: &[u8]| {
    let Ok(event) = ClientEvent::decode(data) else {
        return;
    };

    let raw = event.thread_id().as_str().to_string();
    assert!(ThreadId::parse(raw).is_ok());

    let encoded = event.encode().expect("decoded events re-encode");
    assert_eq!(ClientEvent::decode(encoded.as_bytes()).ok(), Some(event));
});
