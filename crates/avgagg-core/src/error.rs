//! Engine-level errors.
//!
//! Every variant here is a contract violation between the engine and its
//! host, never a data-quality problem: bad input values propagate through the
//! arithmetic instead of being rejected, and an empty aggregate is `None`.

use thiserror::Error;

/// Contract violations raised while binding, merging, or decoding states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// Merge operands disagree on slot count.
    #[error("internal error: incompatible transition states (expected {expected} slots, found {found})")]
    ShapeMismatch {
        /// Slot count of the accumulating (left) state.
        expected: usize,
        /// Slot count of the incoming (right) state.
        found: usize,
    },

    /// Merging would push the combined count past `u64::MAX`.
    ///
    /// Only reachable with records that were not produced by transition and
    /// merge, e.g. corrupted bytes decoded at the boundary.
    #[error("internal error: merged count overflows ({left} + {right})")]
    CountOverflow {
        /// Count of the accumulating (left) state.
        left: u64,
        /// Count of the incoming (right) state.
        right: u64,
    },

    /// The caller's buffer is too short to bind the sum/count slots.
    #[error("state buffer holds {found} slots; at least {required} are needed to bind")]
    ShortBuffer {
        /// Minimum slot count for a binding.
        required: usize,
        /// Slot count supplied by the caller.
        found: usize,
    },

    /// Encoded state bytes have the wrong length.
    #[error("encoded state must be {expected} bytes, got {found}")]
    Encoding {
        /// Canonical encoded length.
        expected: usize,
        /// Length supplied by the caller.
        found: usize,
    },
}
