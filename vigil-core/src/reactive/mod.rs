//! Reactive Primitives
//!
//! This module implements the reactive runtime: the dependency store, effects,
//! refs, and computeds. Observed containers (see [`crate::observe`]) report
//! their reads and writes to it.
//!
//! # Concepts
//!
//! ## Dependency Store
//!
//! Every read of an observed `(target, key)` pair inside a running effect is
//! recorded as an edge between that pair's Dep and the effect. A write looks
//! up the Deps it affects and notifies their subscribers.
//!
//! ## Effects
//!
//! An Effect is a computation that re-runs whenever something it read
//! changes. Its edges are dropped before every run and rebuilt by the run
//! itself, so it only ever depends on what its latest run actually read.
//!
//! ## Refs
//!
//! A Ref is a single reactive cell with the same track/trigger contract as a
//! record property.
//!
//! ## Computeds
//!
//! A Computed is a lazy, cached derived value. A change only marks it dirty;
//! the getter runs again on the next read.
//!
//! # Implementation Notes
//!
//! The runtime keeps its state in thread-locals: the stack of running
//! computations, the tracking switch, the subscriber registry and the store.
//! Reactive handles are reference counted and `!Send`, so one thread is one
//! independent reactive world.

mod computed;
mod context;
mod dep;
mod effect;
mod reference;
mod runtime;
mod subscriber;

pub use computed::{computed, writable_computed, Computed, ComputedOptions, ComputedState};
pub use context::{enable_tracking, pause_tracking, untracked, ReactiveContext, TrackingGuard};
pub use dep::DepOrigin;
pub use effect::{
    effect, effect_with, on_cleanup, DebugHook, DebuggerEvent, DebuggerEventKind, Effect,
    EffectOptions, Scheduler,
};
pub use reference::{reference, Ref, RefLike};
pub use runtime::{Reactive, Runtime, TrackKey, TrackOp, Trigger, TriggerOp};
pub use subscriber::{Job, SubscriberId};
