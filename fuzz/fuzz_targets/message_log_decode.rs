//! Fuzz target for MessageLog::from_json
//!
//! The persisted log is read back from storage that other code may have
//! written. Loading must never panic, and a loaded log must survive a save.

#![no_main]

use chitchat_core::MessageLog;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(log) = MessageLog::from_json(text) else {
        return;
    };

    let json = log.to_json().expect("loaded log serializes");
    let reloaded = MessageLog::from_json(&json).expect("saved log loads");
    assert_eq!(log, reloaded);
});
