#![no_main]

use libfuzzer_sys::fuzz_target;
use sponge_wire::snapshot::{decode_snapshot, encode_snapshot};

// Fuzz target: snapshot file decoding of arbitrary bytes.
//
// Catches bugs in:
// - Magic and version validation
// - Length-prefixed key/value framing
// - Collection name UTF-8 handling
//
// Decoded records must survive a re-encode unchanged.
fuzz_target!(|data: &[u8]| {
    let Ok(records) = decode_snapshot(data) else {
        return;
    };
    let encoded = encode_snapshot(&records).unwrap();
    assert_eq!(decode_snapshot(&encoded).unwrap(), records);
});
