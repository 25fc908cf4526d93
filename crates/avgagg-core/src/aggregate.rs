//! Transition / merge / final over bound partial states.
//!
//! An [`Aggregate`] is three stateless operations on one state layout. The
//! host executor creates zeroed records, drives [`Aggregate::transition`] per
//! partition, combines with [`Aggregate::merge`] in whatever pairing it likes,
//! and calls [`Aggregate::finalize`] exactly once on the combined record.
//!
//! ## Invariants
//! - `merge` is associative and commutative over the multiset of transitioned
//!   values (exactly for `count`, up to summation order for `sum`).
//! - `count` after any sequence of operations equals the number of values
//!   transitioned into every contributing state.
//! - Merging operands of different slot counts fails before any slot is
//!   written.
//!
//! Finalizing twice, or transitioning after finalize, is caller misuse at this
//! level; the record has no spare slot to remember that it was finalized. Use
//! [`Accumulator`] when that guarantee should come from the type system.

use crate::{PartialState, StateError, StateMut, StateView, STATE_SLOTS};

/// A mergeable aggregate over bound partial states.
pub trait Aggregate {
    /// Fold one input value into `state` and hand the same binding back.
    #[must_use]
    fn transition<'a>(&self, state: StateMut<'a>, value: f64) -> StateMut<'a>;

    /// Fold `right` into `left` and hand `left` back.
    ///
    /// # Errors
    /// [`StateError::ShapeMismatch`] if the operands' slot counts differ;
    /// [`StateError::CountOverflow`] if the combined count does not fit.
    /// `left` is untouched on error.
    fn merge<'a>(
        &self,
        left: StateMut<'a>,
        right: StateView<'_>,
    ) -> Result<StateMut<'a>, StateError>;

    /// Project `state` into its result in place; `None` if nothing was seen.
    #[must_use]
    fn finalize<'a>(&self, state: StateMut<'a>) -> Option<StateMut<'a>>;
}

/// Arithmetic mean.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mean;

impl Mean {
    /// Construct a new [`Mean`].
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Aggregate for Mean {
    #[inline]
    fn transition<'a>(&self, mut state: StateMut<'a>, value: f64) -> StateMut<'a> {
        // No validation: NaN and infinities propagate through the sum.
        state.set_sum(state.sum() + value);
        state.set_count(state.count() + 1);
        state
    }

    #[inline]
    fn merge<'a>(
        &self,
        mut left: StateMut<'a>,
        right: StateView<'_>,
    ) -> Result<StateMut<'a>, StateError> {
        if left.slot_count() != right.slot_count() {
            return Err(StateError::ShapeMismatch {
                expected: left.slot_count(),
                found: right.slot_count(),
            });
        }
        let count = left
            .count()
            .checked_add(right.count())
            .ok_or_else(|| StateError::CountOverflow {
                left: left.count(),
                right: right.count(),
            })?;
        left.set_count(count);
        left.set_sum(left.sum() + right.sum());
        Ok(left)
    }

    #[inline]
    fn finalize<'a>(&self, mut state: StateMut<'a>) -> Option<StateMut<'a>> {
        // An aggregate over an empty set is absent, not zero.
        if state.count() == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = state.count() as f64;
        state.set_sum(state.sum() / n);
        Some(state)
    }
}

/// Fold `value` into `state` with [`Mean`].
#[inline]
#[must_use]
pub fn transition(state: StateMut<'_>, value: f64) -> StateMut<'_> {
    Mean.transition(state, value)
}

/// Merge `right` into `left` with [`Mean`].
///
/// # Errors
/// See [`Aggregate::merge`].
#[inline]
pub fn merge<'a>(left: StateMut<'a>, right: StateView<'_>) -> Result<StateMut<'a>, StateError> {
    Mean.merge(left, right)
}

/// Finalize `state` with [`Mean`]; the sum slot holds the mean afterwards.
#[inline]
#[must_use]
pub fn finalize(state: StateMut<'_>) -> Option<StateMut<'_>> {
    Mean.finalize(state)
}

/// Finalize `state` and read the mean out of the sum slot.
#[inline]
#[must_use]
pub fn finalize_mean(state: StateMut<'_>) -> Option<f64> {
    finalize(state).map(|s| s.sum())
}

/// Owned mean accumulator backed by its own slot record.
///
/// Same algebra as the bound operations, but [`Accumulator::finish`] consumes
/// the accumulator, so finalizing twice or transitioning after finalize does
/// not compile.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Accumulator {
    record: [u64; STATE_SLOTS],
}

impl Accumulator {
    /// An empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            record: crate::state::zeroed(),
        }
    }

    /// Resume from a previously saved partial state.
    ///
    /// A state whose count is already `u64::MAX` can take no more values:
    /// [`Accumulator::push`] then overflows (a panic in debug builds), while
    /// [`Accumulator::try_push`] reports [`StateError::CountOverflow`].
    #[must_use]
    pub fn from_partial(state: PartialState) -> Self {
        Self {
            record: state.to_slots(),
        }
    }

    fn bound(&mut self) -> StateMut<'_> {
        StateMut::from_record(&mut self.record)
    }

    /// Fold one value.
    ///
    /// The count must not already be `u64::MAX`; see [`Accumulator::try_push`].
    pub fn push(&mut self, value: f64) {
        let _ = transition(self.bound(), value);
    }

    /// Fold one value, refusing it if the count is saturated.
    ///
    /// # Errors
    /// [`StateError::CountOverflow`] when the count is already `u64::MAX`;
    /// the state is untouched.
    pub fn try_push(&mut self, value: f64) -> Result<(), StateError> {
        let count = self.count();
        if count == u64::MAX {
            return Err(StateError::CountOverflow {
                left: count,
                right: 1,
            });
        }
        self.push(value);
        Ok(())
    }

    /// Fold another accumulator's data into this one.
    ///
    /// # Errors
    /// [`StateError::CountOverflow`] if the combined count does not fit.
    pub fn merge(&mut self, other: &Self) -> Result<(), StateError> {
        self.merge_view(StateView::from_record(&other.record))
    }

    /// Fold a bound state (e.g. one decoded from disk) into this one.
    ///
    /// # Errors
    /// See [`Aggregate::merge`].
    pub fn merge_view(&mut self, view: StateView<'_>) -> Result<(), StateError> {
        merge(self.bound(), view).map(|_| ())
    }

    /// Number of values seen so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        StateView::from_record(&self.record).count()
    }

    /// Snapshot the current partial state.
    #[must_use]
    pub fn state(&self) -> PartialState {
        StateView::from_record(&self.record).to_partial()
    }

    /// Consume the accumulator and produce the mean, or `None` if empty.
    #[must_use]
    pub fn finish(mut self) -> Option<f64> {
        finalize_mean(self.bound())
    }
}

impl Extend<f64> for Accumulator {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for v in iter {
            self.push(v);
        }
    }
}

impl FromIterator<f64> for Accumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::new();
        acc.extend(iter);
        acc
    }
}
