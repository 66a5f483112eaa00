//! Observed Containers
//!
//! This module is the wrapper layer: it turns plain containers into
//! observed ones whose reads and writes go through the dependency store.
//!
//! # Concepts
//!
//! ## Targets
//!
//! A [`Target`] is a raw container: a record, a sequence, a map or a set of
//! dynamically typed [`Value`]s. Raw access never tracks or triggers.
//!
//! ## Wrappers
//!
//! An [`Observed`] wraps one target in a [`Mode`]. Reads through it are
//! recorded as dependencies of the running effect; writes notify the effects
//! that read what changed. Nested containers are wrapped the first time
//! they are read, not when the parent is wrapped.
//!
//! ## Identity
//!
//! There is one live wrapper per target and mode, so wrapping twice gives
//! the same wrapper, and [`to_raw`] always leads back to the original
//! target. Sequences may be backed by a custom [`Sequence`] type; wrappers
//! call that type's own methods.
//!
//! # Example
//!
//! ```rust,ignore
//! let state = reactive(&Target::record_from([("count", 0)]));
//!
//! let s = state.clone();
//! let _effect = effect(move || println!("count = {}", s.get("count")));
//!
//! state.set("count", 1)?; // Prints: "count = 1"
//! ```

mod collection;
mod handlers;
mod sequence;
mod target;
mod value;
mod wrapper;

pub use sequence::{Array, Sequence};
pub use target::{Target, TargetId, TargetKind, MAX_SEQUENCE_LENGTH};
pub use value::{PropKey, Value};
pub use wrapper::{
    is_observed, is_reactive, is_readonly, is_ref, is_shallow, observe, observe_value, reactive,
    readonly, shallow_reactive, shallow_readonly, to_raw, Mode, Observed,
};
