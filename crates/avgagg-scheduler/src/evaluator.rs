//! Reference executor that **drives** the aggregate end-to-end.
//!
//! It does three things, in the roles a host query executor would play:
//! 1) **Allocates** one zeroed record per partition in a flat slot arena and
//!    binds each region for the duration of a call.
//! 2) **Transitions** every partition's values into its own record,
//!    optionally on the rayon pool (one writer per record).
//! 3) **Merges** the records in the configured [`ReduceOrder`] and calls final
//!    once on the root.
//!
//! The reduce orders exist to exercise order independence: every order must
//! agree with a sequential fold up to floating-point summation order.

use crate::{DfsScheduler, Event};
use anyhow::{bail, ensure, Context, Result};
use rayon::prelude::*;
use avgagg_core::{Aggregate, Mean, PartialState, StateMut, StateView, STATE_SLOTS};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How partial states are paired during reduction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReduceOrder {
    /// Fold records `2..=T` into record 1, left to right.
    Sequential,
    /// Fold records `T-1..=1` into record `T`, right to left.
    Reverse,
    /// Balanced midpoint tree, merged in DFS post-order.
    #[default]
    Balanced,
}

impl FromStr for ReduceOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "reverse" => Ok(Self::Reverse),
            "balanced" => Ok(Self::Balanced),
            other => bail!("unknown reduce order {other:?} (expected sequential, reverse, or balanced)"),
        }
    }
}

impl fmt::Display for ReduceOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequential => "sequential",
            Self::Reverse => "reverse",
            Self::Balanced => "balanced",
        })
    }
}

/// Executor knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReduceOptions {
    /// Merge pairing.
    pub order: ReduceOrder,
    /// Number of partitions [`Evaluator::evaluate`] splits its input into.
    pub partitions: usize,
    /// Run per-partition transitions on the rayon thread pool.
    pub parallel: bool,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            order: ReduceOrder::Balanced,
            partitions: 4,
            parallel: false,
        }
    }
}

impl ReduceOptions {
    /// Merge environment overrides into these options.
    ///
    /// Recognized variables:
    /// - `AVGAGG_REDUCE_ORDER` = `sequential` | `reverse` | `balanced`
    /// - `AVGAGG_PARTITIONS` = `<usize>` (> 0)
    /// - `AVGAGG_PARALLEL` = `0` | `1` | `true` | `false`
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Ok(order) = std::env::var("AVGAGG_REDUCE_ORDER") {
            if let Ok(order) = order.parse() {
                self.order = order;
            }
        }
        if let Ok(p) = std::env::var("AVGAGG_PARTITIONS") {
            if let Ok(v) = p.parse::<usize>() {
                if v > 0 {
                    self.partitions = v;
                }
            }
        }
        if let Ok(flag) = std::env::var("AVGAGG_PARALLEL") {
            match flag.to_ascii_lowercase().as_str() {
                "1" | "true" => self.parallel = true,
                "0" | "false" => self.parallel = false,
                _ => {}
            }
        }
        self
    }
}

/// Executor-owned storage: `len` two-slot records laid out back to back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateArena {
    slots: Vec<u64>,
}

impl StateArena {
    /// `len` zero-initialised records.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            slots: vec![0; len * STATE_SLOTS],
        }
    }

    /// Arena holding copies of `states`, in order.
    #[must_use]
    pub fn from_states(states: &[PartialState]) -> Self {
        Self {
            slots: states.iter().flat_map(PartialState::to_slots).collect(),
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() / STATE_SLOTS
    }

    /// `true` if the arena holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn region(idx: usize) -> std::ops::Range<usize> {
        idx * STATE_SLOTS..(idx + 1) * STATE_SLOTS
    }

    /// Bind record `idx` (0-based) read-only.
    pub fn record(&self, idx: usize) -> Result<StateView<'_>> {
        ensure!(idx < self.len(), "record {idx} out of range (len {})", self.len());
        Ok(StateView::bind(&self.slots[Self::region(idx)])?)
    }

    /// Bind record `idx` (0-based) mutably.
    pub fn record_mut(&mut self, idx: usize) -> Result<StateMut<'_>> {
        ensure!(idx < self.len(), "record {idx} out of range (len {})", self.len());
        Ok(StateMut::bind(&mut self.slots[Self::region(idx)])?)
    }

    /// Bind `left` mutably and `right` read-only at the same time.
    fn pair(&mut self, left: usize, right: usize) -> Result<(StateMut<'_>, StateView<'_>)> {
        ensure!(left != right, "cannot merge record {left} into itself");
        ensure!(
            left < self.len() && right < self.len(),
            "merge pair ({left}, {right}) out of range (len {})",
            self.len()
        );
        let (l, r) = if left < right {
            let (head, tail) = self.slots.split_at_mut(right * STATE_SLOTS);
            (&mut head[Self::region(left)], &tail[..STATE_SLOTS])
        } else {
            let (head, tail) = self.slots.split_at_mut(left * STATE_SLOTS);
            (&mut tail[..STATE_SLOTS], &head[Self::region(right)])
        };
        Ok((StateMut::bind(l)?, StateView::bind(r)?))
    }

    /// Disjoint mutable regions, one per record.
    fn records_mut(&mut self) -> impl Iterator<Item = &mut [u64]> {
        self.slots.chunks_exact_mut(STATE_SLOTS)
    }
}

/// One-shot reference executor.
#[derive(Clone, Debug, Default)]
pub struct Evaluator<A = Mean> {
    aggregate: A,
    opts: ReduceOptions,
}

impl Evaluator<Mean> {
    /// Mean executor with the given options.
    #[must_use]
    pub const fn new(opts: ReduceOptions) -> Self {
        Self {
            aggregate: Mean,
            opts,
        }
    }
}

impl<A: Aggregate + Sync> Evaluator<A> {
    /// Executor over an explicit aggregate.
    #[must_use]
    pub const fn with_aggregate(aggregate: A, opts: ReduceOptions) -> Self {
        Self { aggregate, opts }
    }

    /// Active options.
    #[must_use]
    pub const fn options(&self) -> &ReduceOptions {
        &self.opts
    }

    /// Split `values` into the configured number of partitions and evaluate.
    ///
    /// The partition count is capped at `values.len()` (at least one): extra
    /// partitions would only be empty identity states.
    pub fn evaluate(&self, values: &[f64]) -> Result<Option<f64>> {
        ensure!(self.opts.partitions > 0, "partition count must be > 0");
        let n = self.opts.partitions.min(values.len().max(1));
        if n < self.opts.partitions {
            debug!(requested = self.opts.partitions, used = n, "capped partition count");
        }
        let parts = crate::partition_values(values, n);
        self.evaluate_partitions(&parts)
    }

    /// Evaluate the mean over explicit partitions.
    ///
    /// Zero partitions is an empty aggregate and yields `Ok(None)`.
    pub fn evaluate_partitions(&self, parts: &[&[f64]]) -> Result<Option<f64>> {
        let mut arena = self.transition_partitions(parts)?;
        let Some(root) = self.reduce(&mut arena)? else {
            return Ok(None);
        };
        self.finalize(&mut arena, root)
    }

    /// Fold each partition into its own zeroed record.
    pub fn transition_partitions(&self, parts: &[&[f64]]) -> Result<StateArena> {
        let mut arena = StateArena::zeroed(parts.len());
        let aggregate = &self.aggregate;

        if self.opts.parallel && parts.len() > 1 {
            arena
                .slots
                .par_chunks_exact_mut(STATE_SLOTS)
                .zip(parts.par_iter())
                .try_for_each(|(rec, part)| fold_into(aggregate, rec, part))?;
        } else {
            for (rec, part) in arena.records_mut().zip(parts) {
                fold_into(aggregate, rec, part)?;
            }
        }

        debug!(
            partitions = parts.len(),
            parallel = self.opts.parallel,
            "transitioned partitions"
        );
        Ok(arena)
    }

    /// Merge every record of `arena` into one; returns the root record index,
    /// or `None` if the arena is empty.
    pub fn reduce(&self, arena: &mut StateArena) -> Result<Option<usize>> {
        let n = arena.len();
        if n == 0 {
            return Ok(None);
        }

        let root = match self.opts.order {
            ReduceOrder::Sequential => {
                for k in 1..n {
                    self.merge_records(arena, 0, k)?;
                }
                0
            }
            ReduceOrder::Reverse => {
                let last = n - 1;
                for k in (0..last).rev() {
                    self.merge_records(arena, last, k)?;
                }
                last
            }
            ReduceOrder::Balanced => {
                for ev in DfsScheduler::new(n) {
                    match ev {
                        Event::Leaf(_) => {}
                        Event::Combine(l, r) => {
                            self.merge_records(arena, l.first, r.first)
                                .with_context(|| format!("combining {l} with {r}"))?;
                        }
                        Event::Done => break,
                    }
                }
                0
            }
        };

        debug!(records = n, order = %self.opts.order, root, "reduced partial states");
        Ok(Some(root))
    }

    /// Call final on record `root` and read the result out.
    pub fn finalize(&self, arena: &mut StateArena, root: usize) -> Result<Option<f64>> {
        let state = arena.record_mut(root)?;
        Ok(self.aggregate.finalize(state).map(|s| s.sum()))
    }

    /// Merge already-computed partial states (e.g. loaded from files) into one,
    /// without finalizing.
    pub fn reduce_states(&self, states: &[PartialState]) -> Result<PartialState> {
        let mut arena = StateArena::from_states(states);
        match self.reduce(&mut arena)? {
            Some(root) => Ok(arena.record(root)?.to_partial()),
            None => Ok(PartialState::EMPTY),
        }
    }

    fn merge_records(&self, arena: &mut StateArena, left: usize, right: usize) -> Result<()> {
        let (l, r) = arena.pair(left, right)?;
        let merged = self
            .aggregate
            .merge(l, r)
            .with_context(|| format!("merging record {right} into record {left}"))?;
        debug!(left, right, count = merged.count(), "merged");
        Ok(())
    }
}

fn fold_into<A: Aggregate>(aggregate: &A, rec: &mut [u64], values: &[f64]) -> Result<()> {
    let mut state = StateMut::bind(rec)?;
    for &v in values {
        state = aggregate.transition(state, v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(order: ReduceOrder, partitions: usize) -> ReduceOptions {
        ReduceOptions {
            order,
            partitions,
            parallel: false,
        }
    }

    #[test]
    fn three_values_every_order() {
        for order in [
            ReduceOrder::Sequential,
            ReduceOrder::Reverse,
            ReduceOrder::Balanced,
        ] {
            let ev = Evaluator::new(opts(order, 2));
            assert_eq!(ev.evaluate(&[2.0, 4.0, 6.0]).unwrap(), Some(4.0), "{order}");
        }
    }

    #[test]
    fn explicit_split_matches_single_partition() {
        let ev = Evaluator::new(ReduceOptions::default());
        let one = ev.evaluate_partitions(&[&[2.0, 4.0, 6.0]]).unwrap();
        let two = ev.evaluate_partitions(&[&[2.0], &[4.0, 6.0]]).unwrap();
        assert_eq!(one, Some(4.0));
        assert_eq!(two, Some(4.0));
    }

    #[test]
    fn empty_inputs_have_no_value() {
        let ev = Evaluator::new(opts(ReduceOrder::Balanced, 3));
        assert_eq!(ev.evaluate(&[]).unwrap(), None);
        assert_eq!(ev.evaluate_partitions(&[]).unwrap(), None);
        assert_eq!(ev.reduce_states(&[]).unwrap(), PartialState::EMPTY);
    }

    #[test]
    fn balanced_reduce_keeps_root_in_first_record() {
        let ev = Evaluator::new(opts(ReduceOrder::Balanced, 5));
        let parts: [&[f64]; 5] = [&[1.0], &[2.0], &[3.0], &[4.0], &[5.0]];
        let mut arena = ev.transition_partitions(&parts).unwrap();
        assert_eq!(ev.reduce(&mut arena).unwrap(), Some(0));
        let root = arena.record(0).unwrap();
        assert_eq!(root.count(), 5);
        assert_eq!(root.sum(), 15.0);
    }

    #[test]
    fn reverse_reduce_keeps_root_in_last_record() {
        let ev = Evaluator::new(opts(ReduceOrder::Reverse, 3));
        let mut arena = StateArena::from_states(&[
            PartialState::new(1.0, 1),
            PartialState::new(2.0, 2),
            PartialState::new(3.0, 3),
        ]);
        assert_eq!(ev.reduce(&mut arena).unwrap(), Some(2));
        assert_eq!(arena.record(2).unwrap().to_partial(), PartialState::new(6.0, 6));
        assert_eq!(ev.finalize(&mut arena, 2).unwrap(), Some(1.0));
    }

    #[test]
    fn parallel_transitions_match_sequential() {
        let values: Vec<f64> = (1..=1000).map(f64::from).collect();
        let seq = Evaluator::new(opts(ReduceOrder::Balanced, 8));
        let par = Evaluator::new(ReduceOptions {
            parallel: true,
            ..opts(ReduceOrder::Balanced, 8)
        });
        let a = seq.transition_partitions(&crate::partition_values(&values, 8)).unwrap();
        let b = par.transition_partitions(&crate::partition_values(&values, 8)).unwrap();
        assert_eq!(a, b);
        assert_eq!(par.evaluate(&values).unwrap(), Some(500.5));
    }

    #[test]
    fn reduce_states_does_not_finalize() {
        let ev = Evaluator::new(opts(ReduceOrder::Sequential, 1));
        let merged = ev
            .reduce_states(&[PartialState::new(3.0, 1), PartialState::new(5.0, 3)])
            .unwrap();
        assert_eq!(merged, PartialState::new(8.0, 4));
    }

    #[test]
    fn pair_rejects_self_merge() {
        let mut arena = StateArena::zeroed(2);
        assert!(arena.pair(1, 1).is_err());
        assert!(arena.pair(0, 2).is_err());
    }

    #[test]
    fn huge_partition_count_is_capped_to_the_input() {
        for partitions in [3, 1 << 20, usize::MAX / 2, usize::MAX] {
            let ev = Evaluator::new(opts(ReduceOrder::Balanced, partitions));
            assert_eq!(ev.evaluate(&[1.0, 2.0]).unwrap(), Some(1.5), "{partitions}");
            assert_eq!(ev.evaluate(&[]).unwrap(), None, "{partitions}");
        }
    }

    #[test]
    fn environment_overrides_options() {
        use std::sync::Mutex;
        static ENV_LOCK: Mutex<()> = Mutex::new(());
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        const VARS: [&str; 3] = ["AVGAGG_REDUCE_ORDER", "AVGAGG_PARTITIONS", "AVGAGG_PARALLEL"];
        let set = |order: &str, partitions: &str, parallel: &str| {
            for (k, v) in VARS.iter().zip([order, partitions, parallel]) {
                std::env::set_var(k, v);
            }
        };

        set("Reverse", "7", "true");
        let got = ReduceOptions::default().with_env();
        assert_eq!(
            got,
            ReduceOptions {
                order: ReduceOrder::Reverse,
                partitions: 7,
                parallel: true,
            }
        );

        set("sequential", "0", "0");
        let got = got.with_env();
        assert_eq!(got.order, ReduceOrder::Sequential);
        assert_eq!(got.partitions, 7, "zero partitions are ignored");
        assert!(!got.parallel);

        // Unparseable values leave the options as they were.
        set("tree", "-3", "maybe");
        assert_eq!(got.with_env(), got);

        for k in VARS {
            std::env::remove_var(k);
        }
        assert_eq!(ReduceOptions::default().with_env(), ReduceOptions::default());
    }

    #[test]
    fn reduce_order_parses_case_insensitively() {
        assert_eq!("Balanced".parse::<ReduceOrder>().unwrap(), ReduceOrder::Balanced);
        assert_eq!("REVERSE".parse::<ReduceOrder>().unwrap(), ReduceOrder::Reverse);
        assert!("tree".parse::<ReduceOrder>().is_err());
    }
}
