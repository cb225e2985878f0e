#![no_main]

use galinheiro_client::protocol::ServerFrame;
use galinheiro_client::RealtimeEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw bytes, including serde_json's own UTF-8 validation.
    if let Ok(frame) = serde_json::from_slice::<ServerFrame>(data) {
        // Whatever parses must convert and re-serialize without panicking.
        let _ = serde_json::to_string(&frame);
        let event = RealtimeEvent::from(frame);
        let _ = event.topic();
    }
});
