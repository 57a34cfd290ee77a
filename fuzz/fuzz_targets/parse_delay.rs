#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::schedule::parse_delay;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Must never panic, whatever the unit soup or digit run length.
    if let Some(delay) = parse_delay(text) {
        assert!(text.bytes().any(|b| b.is_ascii_digit()));
        let _ = delay.as_secs();
    }
});
