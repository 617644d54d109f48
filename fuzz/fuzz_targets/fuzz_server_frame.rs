#![no_main]

use libfuzzer_sys::fuzz_target;
use quiz_room_sync::protocol::{Frame, ServerEvent};
use quiz_room_sync::store::RoomStateStore;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's own UTF-8 validation.
    if let Ok(frame) = serde_json::from_slice::<Frame>(data) {
        if let Ok(ServerEvent::RoomUpdated(snapshot)) = ServerEvent::decode(frame) {
            // Anything that decodes must be storable.
            let mut store = RoomStateStore::new();
            store.replace(*snapshot);
        }
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = ServerEvent::from_text(s);
    }
});
