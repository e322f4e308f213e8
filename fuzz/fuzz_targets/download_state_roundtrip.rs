#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sponge_types::DownloadState;

#[derive(Debug, Arbitrary)]
struct FuzzState {
    /// Size in KiB so the slot count stays small; `None` is unknown.
    size_kib: Option<u32>,
    /// Block ids to mark, in order. Rejected ids are skipped.
    marks: Vec<u16>,
}

// Fuzz target: DownloadState mark→encode→decode roundtrip.
//
// Builds a state from arbitrary marks (out-of-range and frontier
// violations are expected and ignored), then checks that the encoded
// form decodes to an identical state and that completeness agrees.
fuzz_target!(|input: FuzzState| {
    let size = input.size_kib.map(|kib| u64::from(kib) * 1024);
    let Ok(mut state) = DownloadState::new(size) else {
        return;
    };
    for id in input.marks {
        let _ = state.mark_present(u32::from(id));
    }

    let Ok(encoded) = state.encode() else {
        return;
    };
    let decoded = DownloadState::decode(&encoded).unwrap();
    assert_eq!(decoded, state);
    assert_eq!(decoded.is_complete().unwrap(), state.is_complete().unwrap());
});
