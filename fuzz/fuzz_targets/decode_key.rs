#![no_main]
use libfuzzer_sys::fuzz_target;
use movegen_diff::position::{canonicalize, CanonicalKey};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(position) = CanonicalKey::from_wire(s).to_position() {
            let key = canonicalize(&position);
            let decoded = key.to_position().expect("canonical keys are valid positions");
            assert_eq!(canonicalize(&decoded), key);
        }
    }
});
