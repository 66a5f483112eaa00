//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when it is
//! read after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. The getter runs inside an internal lazy [`Effect`], so every read it
//!    makes is tracked as a dependency of that effect.
//!
//! 2. The effect has a scheduler. When a dependency changes, the scheduler
//!    does not recompute; it marks the computed dirty and notifies whoever
//!    read the computed.
//!
//! 3. On the next [`Computed::get`], a dirty computed re-runs the getter and
//!    caches the result. A clean one returns the cache.
//!
//! # Why This Matters
//!
//! - A ref changes
//! - 10 computeds depend on it
//! - Only the computeds actually read again will recompute
//! - Computeds that are never read stay dirty (no wasted work)

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::dep::Dep;
use super::effect::{DebugHook, DebuggerEvent, Effect, EffectOptions, Scheduler};
use super::reference::RefLike;
use super::runtime::{Runtime, TrackOp, TriggerOp};
use super::subscriber::Job;
use crate::diagnostics;
use crate::error::ReactiveError;

/// Cache state of a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed since the last evaluation, or there was none yet.
    Dirty,
}

/// Options for [`Computed::with_options`].
#[derive(Clone)]
pub struct ComputedOptions {
    /// Cache the getter's result. When `false` the getter runs, untracked,
    /// on every read.
    pub cacheable: bool,
    /// Debug hook for the getter's dependency edges.
    pub on_track: Option<DebugHook>,
    /// Debug hook for changes reaching the getter.
    pub on_trigger: Option<DebugHook>,
}

impl Default for ComputedOptions {
    fn default() -> Self {
        Self {
            cacheable: true,
            on_track: None,
            on_trigger: None,
        }
    }
}

impl ComputedOptions {
    /// Recompute on every read.
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }

    /// Set the track debug hook.
    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.on_track = Some(Rc::new(hook));
        self
    }

    /// Set the trigger debug hook.
    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + 'static,
    {
        self.on_trigger = Some(Rc::new(hook));
        self
    }
}

/// State shared between the computed and its effect's scheduler.
struct Shared {
    dirty: Cell<bool>,
    dep: Rc<Dep>,
}

struct ComputedInner<T: 'static> {
    effect: Effect<T>,
    shared: Rc<Shared>,
    value: RefCell<Option<T>>,
    setter: Option<Box<dyn Fn(T)>>,
    cacheable: bool,
}

/// A cached derived value that recomputes only when read after a change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone so reads can hand
///   out the cached value.
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a readonly computed from a getter.
    ///
    /// The getter is not run until the first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(getter, None, ComputedOptions::default())
    }

    /// Create a writable computed from a getter and a setter.
    ///
    /// The setter is responsible for changing whatever the getter reads.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(getter, Some(Box::new(setter)), ComputedOptions::default())
    }

    /// Create a readonly computed with options.
    pub fn with_options<F>(getter: F, options: ComputedOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(getter, None, options)
    }

    fn build<F>(getter: F, setter: Option<Box<dyn Fn(T)>>, options: ComputedOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let shared = Rc::new(Shared {
            dirty: Cell::new(true),
            dep: Dep::cell(),
        });

        let scheduled = Rc::clone(&shared);
        let mark_dirty: Scheduler = Rc::new(move |_job: Job| {
            if !scheduled.dirty.replace(true) {
                Runtime::trigger_dep(&scheduled.dep, TriggerOp::Set);
            }
        });
        let effect_options = EffectOptions {
            lazy: true,
            scheduler: Some(mark_dirty),
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            ..EffectOptions::default()
        };
        let effect = Effect::with_options(getter, effect_options);
        effect.mark_computed();
        if !options.cacheable {
            effect.stop();
        }

        Self {
            inner: Rc::new(ComputedInner {
                effect,
                shared,
                value: RefCell::new(None),
                setter,
                cacheable: options.cacheable,
            }),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Returns `None` only if the getter reads this same computed while it is
    /// computing its first value. That read is reported as
    /// [`ReactiveError::CyclicComputed`]; a later recursive read gets the
    /// previous cached value instead.
    pub fn try_get(&self) -> Option<T> {
        let inner = &self.inner;
        Runtime::track_dep(&inner.shared.dep, TrackOp::Get);

        if inner.shared.dirty.get() || !inner.cacheable {
            // Cleared only after the getter returned, so a panicking getter
            // leaves the computed dirty.
            if let Some(value) = inner.effect.run() {
                *inner.value.borrow_mut() = Some(value);
                inner.shared.dirty.set(false);
            }
        }

        let value = inner.value.borrow().clone();
        if value.is_none() {
            diagnostics::report(ReactiveError::CyclicComputed);
        }
        value
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the getter reads this same computed while computing its
    /// first value. Use [`try_get`](Self::try_get) where a getter may do so.
    pub fn get(&self) -> T {
        match self.try_get() {
            Some(value) => value,
            None => panic!("{}", ReactiveError::CyclicComputed),
        }
    }

    /// Write through the setter.
    ///
    /// A computed without a setter rejects the write and keeps its cache.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(diagnostics::report(ReactiveError::ReadonlyComputed)),
        }
    }
}

impl<T: 'static> Computed<T> {
    /// Get the current cache state.
    pub fn state(&self) -> ComputedState {
        if self.inner.shared.dirty.get() {
            ComputedState::Dirty
        } else {
            ComputedState::Clean
        }
    }

    /// Whether a setter was supplied.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of effects depending on this computed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.shared.dep.len()
    }

    /// The internal effect running the getter.
    pub fn effect(&self) -> &Effect<T> {
        &self.inner.effect
    }

    /// Stop tracking the getter's dependencies.
    ///
    /// The last cached value is kept; later dirty reads run the getter
    /// untracked.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }
}

impl<T: Clone + 'static> RefLike<T> for Computed<T> {
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        self.set(value)
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("state", &self.state())
            .field("value", &self.inner.value.try_borrow().ok())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a readonly computed.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

/// Create a computed with a setter.
pub fn writable_computed<T, F, S>(getter: F, setter: S) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    Computed::with_setter(getter, setter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
