//! avgagg-core — mergeable mean aggregate over caller-owned partial states.
//!
//! This crate defines the **stable boundary** between the aggregate and the
//! executor that drives it:
//! - the two-slot partial-state layout and its read-only / mutable bindings,
//! - the transition / merge / final operations (the [`Aggregate`] trait and
//!   the [`Mean`] implementation),
//! - an owned [`Accumulator`] for callers that do not manage their own memory,
//! - JSON/CBOR state files and streaming value input.
//!
//! ```no_run
//! use avgagg_core::{bind, bind_mut, finalize_mean, merge, transition, zeroed};
//!
//! let mut left = zeroed();
//! let mut right = zeroed();
//! let _ = transition(bind_mut(&mut left)?, 2.0);
//! let st = transition(bind_mut(&mut right)?, 4.0);
//! let _ = transition(st, 6.0);
//!
//! let st = merge(bind_mut(&mut left)?, bind(&right)?)?;
//! assert_eq!(finalize_mean(st), Some(4.0));
//! # Ok::<(), avgagg_core::StateError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Small, explicit allowlist to keep docs readable and APIs ergonomic.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

/// Transition / merge / final and the owned accumulator.
pub mod aggregate;
/// Contract-violation errors.
pub mod error;
/// JSON/CBOR helpers and auto-detecting read/write APIs.
pub mod io;
/// Streaming JSONL/NDJSON helpers for input values.
pub mod io_jsonl;
/// Slot layout, bindings, and the owned partial state.
pub mod state;

pub use aggregate::*;
pub use error::*;
pub use state::*;

/// Commonly-used items for quick imports.
///
/// ```rust
/// use avgagg_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        aggregate::{finalize, finalize_mean, merge, transition, Accumulator, Aggregate, Mean},
        error::StateError,
        state::{bind, bind_mut, zeroed, PartialState, StateMut, StateView, STATE_SLOTS},
    };
}
