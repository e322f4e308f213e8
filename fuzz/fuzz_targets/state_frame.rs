#![no_main]

use libfuzzer_sys::fuzz_target;
use sponge_types::DownloadState;
use sponge_wire::{StateFrame, BLOCK_SIZE};

// Fuzz target: state frame and DownloadState decoding of arbitrary bytes.
//
// Catches bugs in:
// - Version byte checking
// - Slot count derivation for huge declared sizes
// - Presence flag validation
// - Trailing data rejection
//
// Anything that decodes must re-encode to the exact input: the frame
// format has a single encoding per state.
fuzz_target!(|data: &[u8]| {
    let _ = StateFrame::decode(data, 16);

    if let Ok(state) = DownloadState::decode(data) {
        assert_eq!(state.encode().unwrap(), data);
        let frame = StateFrame::decode(data, BLOCK_SIZE).unwrap();
        assert_eq!(frame.presence, state.presence());
    }
});
