#![no_main]

use galinheiro_client::protocol::RoomCode;
use galinheiro_client::Route;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let _ = s.parse::<RoomCode>();
    if let Ok(route) = s.parse::<Route>() {
        // A parsed route must survive its own path.
        assert_eq!(route.path().parse::<Route>().ok(), Some(route));
    }
});
