// crates/avgagg-scheduler/src/lib.rs

//! Reference executor for the mean aggregate.
//!
//! The aggregate itself never decides how data is split or in what order
//! partial states meet. This crate plays that host role so the contract can
//! be exercised end-to-end:
//! - [`partition_values`]: contiguous, near-equal partitions.
//! - [`DfsScheduler`]: balanced merge tree emitted in post-order with
//!   `O(log n)` live frames.
//! - [`Evaluator`]: owns the slot arena, drives transition, merge, and final.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

/// Pointerless DFS merge schedule.
pub mod dfs;
/// Reference executor: arena, reduce orders, options.
pub mod evaluator;
/// Contiguous partitioning of input values.
pub mod partition;
/// Balanced merge tree spans.
pub mod tree;

pub use dfs::{DfsScheduler, Event};
pub use evaluator::{Evaluator, ReduceOptions, ReduceOrder, StateArena};
pub use partition::partition_values;
pub use tree::Span;
