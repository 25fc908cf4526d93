//! Balanced merge tree over partition records.
//!
//! A [`Span`] names a contiguous run of records `first..=last`; once merged,
//! its partial state lives in record `first`. Splitting at the midpoint keeps
//! the tree balanced, so its height is `ceil(log2(n))`.

use std::fmt;

/// Inclusive run of record indices `first..=last` (0-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    /// First record; holds the merged state of the whole span.
    pub first: usize,
    /// Last record (inclusive).
    pub last: usize,
}

impl Span {
    /// Span covering records `first..=last`.
    #[inline]
    #[must_use]
    pub const fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    /// Span covering all of `n` records.
    ///
    /// # Panics
    /// Panics if `n == 0`; an empty run has no span.
    #[inline]
    #[must_use]
    pub const fn all(n: usize) -> Self {
        assert!(n > 0, "Span::all: no records to span");
        Self::new(0, n - 1)
    }

    /// Number of records covered.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> usize {
        self.last - self.first + 1
    }

    /// `true` for a single record.
    #[inline]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.first == self.last
    }

    /// Midpoint split into two adjacent halves; the left half gets the extra
    /// record when the width is odd. `None` for a leaf.
    #[inline]
    #[must_use]
    pub const fn split(&self) -> Option<(Self, Self)> {
        if self.is_leaf() {
            return None;
        }
        let mid = self.first + (self.last - self.first) / 2;
        Some((Self::new(self.first, mid), Self::new(mid + 1, self.last)))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "records {}..={}", self.first, self.last)
    }
}

/// Height of the balanced tree over `n` records (`0` for `n <= 1`).
#[inline]
#[must_use]
pub const fn height(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_ceil_log2() {
        let got: Vec<u32> = (0..=9).map(height).collect();
        assert_eq!(got, vec![0, 0, 1, 2, 2, 3, 3, 3, 3, 4]);
    }

    #[test]
    fn split_is_adjacent_and_left_heavy() {
        assert_eq!(
            Span::all(8).split(),
            Some((Span::new(0, 3), Span::new(4, 7)))
        );
        assert_eq!(
            Span::new(2, 4).split(),
            Some((Span::new(2, 3), Span::new(4, 4)))
        );
        assert_eq!(Span::new(5, 5).split(), None);
    }

    #[test]
    #[should_panic(expected = "no records to span")]
    fn spanning_zero_records_panics() {
        let _ = Span::all(0);
    }

    #[test]
    fn width_and_display() {
        assert_eq!(Span::new(3, 7).width(), 5);
        assert!(Span::all(1).is_leaf());
        assert_eq!(Span::new(1, 4).to_string(), "records 1..=4");
    }
}
