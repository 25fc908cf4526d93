#![no_main]
use avgagg_core::{bind, bind_mut, io::decode_state_cbor, merge, zeroed, PartialState};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes either decode to a state file or fail cleanly.
    if let Ok(state) = decode_state_cbor(data) {
        let mut left = state.to_slots();
        let _ = merge(bind_mut(&mut left).unwrap(), bind(&state.to_slots()).unwrap());
    }

    if let Ok(state) = PartialState::from_bytes(data) {
        let mut left = state.to_slots();
        let _ = merge(bind_mut(&mut left).unwrap(), bind(&state.to_slots()).unwrap());
    }

    // Records of any width either bind and merge (or report a shape error) or are rejected.
    let words: Vec<u64> = data
        .chunks_exact(8)
        .map(|c| c.iter().rev().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
        .collect();
    if let Ok(view) = bind(&words) {
        let mut left = zeroed();
        let _ = merge(bind_mut(&mut left).unwrap(), view);
    }
});
