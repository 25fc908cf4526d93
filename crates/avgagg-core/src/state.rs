//! Partial-state layout and bindings over caller-owned memory.
//!
//! A partial state is a fixed record of two 64-bit slots:
//!
//! | slot | field   | encoding            |
//! |------|---------|---------------------|
//! | 0    | `sum`   | IEEE-754 `f64` bits |
//! | 1    | `count` | `u64`               |
//!
//! The engine never allocates this record. Callers own a `[u64]` region and
//! the engine *binds* a typed view onto it: [`StateView`] for read-only access
//! and [`StateMut`] for the accumulating side. Both borrow; neither owns.
//!
//! [`PartialState`] is the owned, by-value form used at serialization
//! boundaries and by code that prefers `combine(a, b) -> c` over in-place
//! merging. Its serde representation is the raw slot array so that every
//! persisted copy keeps slot order and widths bit-for-bit.

use crate::StateError;
use serde::{Deserialize, Serialize};

/// Number of slots in a partial state.
pub const STATE_SLOTS: usize = 2;

/// Offset of the running sum.
pub const SUM_SLOT: usize = 0;

/// Offset of the accepted-value count.
pub const COUNT_SLOT: usize = 1;

/// Length of the canonical byte encoding (both slots, little-endian).
pub const ENCODED_LEN: usize = STATE_SLOTS * 8;

/// A fresh, zero-initialised slot record (`sum = 0.0`, `count = 0`).
#[inline]
#[must_use]
pub const fn zeroed() -> [u64; STATE_SLOTS] {
    [0; STATE_SLOTS]
}

#[inline]
const fn check_bindable(found: usize) -> Result<(), StateError> {
    if found < STATE_SLOTS {
        return Err(StateError::ShortBuffer {
            required: STATE_SLOTS,
            found,
        });
    }
    Ok(())
}

/// Read-only binding over a caller-owned slot record.
#[derive(Clone, Copy, Debug)]
pub struct StateView<'a> {
    slots: &'a [u64],
}

impl<'a> StateView<'a> {
    /// Bind a read-only view onto `slots`.
    ///
    /// The buffer only has to be long enough to reach the sum and count slots;
    /// exact-shape agreement is checked where it matters, in merge.
    pub const fn bind(slots: &'a [u64]) -> Result<Self, StateError> {
        match check_bindable(slots.len()) {
            Ok(()) => Ok(Self { slots }),
            Err(e) => Err(e),
        }
    }

    /// Bind onto a record whose length is fixed by its type.
    #[inline]
    #[must_use]
    pub const fn from_record(record: &'a [u64; STATE_SLOTS]) -> Self {
        Self { slots: record }
    }

    /// Running sum (or the mean, after a successful finalize).
    #[inline]
    #[must_use]
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.slots[SUM_SLOT])
    }

    /// Number of accepted values.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u64 {
        self.slots[COUNT_SLOT]
    }

    /// Length of the bound region in slots.
    #[inline]
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Copy the bound fields out into an owned [`PartialState`].
    #[inline]
    #[must_use]
    pub fn to_partial(&self) -> PartialState {
        PartialState::new(self.sum(), self.count())
    }
}

/// Mutable binding over a caller-owned slot record.
///
/// Holding a `StateMut` is holding the only writer: the `&mut` borrow is what
/// serializes Transition and Merge calls against the same state.
#[derive(Debug)]
pub struct StateMut<'a> {
    slots: &'a mut [u64],
}

impl<'a> StateMut<'a> {
    /// Bind a mutable view onto `slots`.
    pub fn bind(slots: &'a mut [u64]) -> Result<Self, StateError> {
        check_bindable(slots.len())?;
        Ok(Self { slots })
    }

    /// Bind onto a record whose length is fixed by its type.
    #[inline]
    pub fn from_record(record: &'a mut [u64; STATE_SLOTS]) -> Self {
        Self { slots: record }
    }

    /// Running sum (or the mean, after a successful finalize).
    #[inline]
    #[must_use]
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.slots[SUM_SLOT])
    }

    /// Number of accepted values. Stale after finalize.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u64 {
        self.slots[COUNT_SLOT]
    }

    /// Length of the bound region in slots.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn set_sum(&mut self, sum: f64) {
        self.slots[SUM_SLOT] = sum.to_bits();
    }

    #[inline]
    pub(crate) fn set_count(&mut self, count: u64) {
        self.slots[COUNT_SLOT] = count;
    }

    /// Reborrow as a read-only view.
    #[inline]
    #[must_use]
    pub fn view(&self) -> StateView<'_> {
        StateView { slots: &*self.slots }
    }

    /// Copy the bound fields out into an owned [`PartialState`].
    #[inline]
    #[must_use]
    pub fn to_partial(&self) -> PartialState {
        PartialState::new(self.sum(), self.count())
    }
}

/// Bind a read-only view (shorthand for [`StateView::bind`]).
pub const fn bind(slots: &[u64]) -> Result<StateView<'_>, StateError> {
    StateView::bind(slots)
}

/// Bind a mutable view (shorthand for [`StateMut::bind`]).
pub fn bind_mut(slots: &mut [u64]) -> Result<StateMut<'_>, StateError> {
    StateMut::bind(slots)
}

/// Owned partial state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[u64; STATE_SLOTS]", into = "[u64; STATE_SLOTS]")]
pub struct PartialState {
    /// Sum of accepted values.
    pub sum: f64,
    /// Number of accepted values.
    pub count: u64,
}

impl PartialState {
    /// The state of an untouched partition.
    pub const EMPTY: Self = Self::new(0.0, 0);

    /// Construct from explicit fields.
    #[inline]
    #[must_use]
    pub const fn new(sum: f64, count: u64) -> Self {
        Self { sum, count }
    }

    /// `true` if no value ever contributed to this state.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Combine two states into a new one. Neither operand is modified.
    ///
    /// Same algebra and failure as the in-place merge: a combined count past
    /// `u64::MAX` is [`StateError::CountOverflow`].
    #[inline]
    pub fn combine(&self, other: &Self) -> Result<Self, StateError> {
        let count = self
            .count
            .checked_add(other.count)
            .ok_or(StateError::CountOverflow {
                left: self.count,
                right: other.count,
            })?;
        Ok(Self {
            sum: self.sum + other.sum,
            count,
        })
    }

    /// Lay the state out as a slot record.
    #[inline]
    #[must_use]
    pub fn to_slots(&self) -> [u64; STATE_SLOTS] {
        let mut slots = zeroed();
        slots[SUM_SLOT] = self.sum.to_bits();
        slots[COUNT_SLOT] = self.count;
        slots
    }

    /// Read a state from a slot record of exactly [`STATE_SLOTS`] words.
    pub fn from_slots(slots: &[u64]) -> Result<Self, StateError> {
        if slots.len() != STATE_SLOTS {
            return Err(StateError::ShapeMismatch {
                expected: STATE_SLOTS,
                found: slots.len(),
            });
        }
        Ok(StateView { slots }.to_partial())
    }

    /// Canonical byte encoding: each slot little-endian, in slot order.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut out = [0u8; ENCODED_LEN];
        for (chunk, word) in out.chunks_exact_mut(8).zip(self.to_slots()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Decode the canonical byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        if bytes.len() != ENCODED_LEN {
            return Err(StateError::Encoding {
                expected: ENCODED_LEN,
                found: bytes.len(),
            });
        }
        let mut slots = zeroed();
        for (slot, chunk) in slots.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            *slot = u64::from_le_bytes(word);
        }
        Ok(Self::from(slots))
    }
}

impl From<[u64; STATE_SLOTS]> for PartialState {
    fn from(slots: [u64; STATE_SLOTS]) -> Self {
        Self::new(f64::from_bits(slots[SUM_SLOT]), slots[COUNT_SLOT])
    }
}

impl From<PartialState> for [u64; STATE_SLOTS] {
    fn from(state: PartialState) -> Self {
        state.to_slots()
    }
}

impl From<StateView<'_>> for PartialState {
    fn from(view: StateView<'_>) -> Self {
        view.to_partial()
    }
}
