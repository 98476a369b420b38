//! Fuzz target for Frame::decode
//!
//! Inbound bytes come straight off a peer's data channel. Decoding must never
//! panic; anything that decodes must re-encode and decode to the same frame.

#![no_main]

use chitchat_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let bytes = frame.encode().expect("decoded frame re-encodes");
    let again = Frame::decode(&bytes).expect("re-encoded frame decodes");
    assert_eq!(frame, again);
});
