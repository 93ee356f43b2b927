#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(history) = chatrelay::sessions::decode_history(data) {
        let _ = history.len();
    }
});
