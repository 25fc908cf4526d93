//! Post-order walk of the balanced merge tree.
//!
//! Leaves come out left to right, and `Combine(left, right)` only after both
//! halves are complete. Because a merged span lives in its first record, the
//! executor always finds both operands in place. The walk keeps at most
//! `height(n) + 1` frames alive.

use crate::tree::{height, Span};

/// One step of the merge schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// Record `k` is a finished leaf.
    Leaf(usize),
    /// Merge `right.first` into `left.first`; together they cover the parent.
    Combine(Span, Span),
    /// Schedule exhausted.
    Done,
}

#[derive(Clone, Copy, Debug)]
enum Stage {
    Fresh,
    LeftMerged,
    BothMerged,
}

/// Iterator over the merge schedule of `n` records.
#[derive(Clone, Debug)]
pub struct DfsScheduler {
    stack: Vec<(Span, Stage)>,
    finished: bool,
}

impl DfsScheduler {
    /// Schedule for `n` records. With `n == 0` the only event is `Done`.
    #[must_use]
    pub fn new(n: usize) -> Self {
        let mut stack = Vec::with_capacity(height(n) as usize + 1);
        if n > 0 {
            stack.push((Span::all(n), Stage::Fresh));
        }
        Self {
            stack,
            finished: false,
        }
    }
}

impl Iterator for DfsScheduler {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            let Some((span, stage)) = self.stack.last_mut() else {
                if self.finished {
                    return None;
                }
                self.finished = true;
                return Some(Event::Done);
            };

            let Some((left, right)) = span.split() else {
                let k = span.first;
                self.stack.pop();
                return Some(Event::Leaf(k));
            };

            match *stage {
                Stage::Fresh => {
                    *stage = Stage::LeftMerged;
                    self.stack.push((left, Stage::Fresh));
                }
                Stage::LeftMerged => {
                    *stage = Stage::BothMerged;
                    self.stack.push((right, Stage::Fresh));
                }
                Stage::BothMerged => {
                    self.stack.pop();
                    return Some(Event::Combine(left, right));
                }
            }
        }
    }
}
