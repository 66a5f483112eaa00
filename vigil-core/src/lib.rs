//! Vigil Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Observed containers (records, sequences, maps, sets)
//! - A dependency store mapping observed keys to the computations reading them
//! - Effects that re-run when what they read changes
//! - Refs and lazily cached computeds
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observe`: Raw targets, dynamic values, and the observed wrapper layer
//! - `reactive`: Dependency store, effect runtime, refs and computeds
//! - `error`: The error type for rejected operations
//! - `diagnostics`: The warn channel rejected operations are reported on
//!
//! All reactive state is per thread. Handles are `!Send`.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_core::observe::{reactive, Target};
//! use vigil_core::reactive::{computed, effect};
//!
//! // Observe a record
//! let state = reactive(&Target::record_from([("count", 1)]));
//!
//! // Create a derived value
//! let s = state.clone();
//! let doubled = computed(move || s.get("count").as_number().unwrap_or(0.0) * 2.0);
//!
//! // Create an effect
//! let d = doubled.clone();
//! let _effect = effect(move || println!("doubled: {}", d.get()));
//!
//! // Update the record
//! state.set("count", 5)?;
//! // Effect automatically runs, prints: "doubled: 10"
//! ```

pub mod diagnostics;
pub mod error;
pub mod observe;
pub mod reactive;

pub use error::{ReactiveError, ReactiveResult};
pub use observe::{
    is_observed, is_reactive, is_readonly, is_ref, is_shallow, observe, observe_value, reactive,
    readonly, shallow_reactive, shallow_readonly, to_raw, Mode, Observed, PropKey, Target,
    TargetKind, Value,
};
pub use reactive::{
    computed, effect, effect_with, on_cleanup, reference, untracked, writable_computed, Computed,
    Effect, EffectOptions, Ref, RefLike,
};
