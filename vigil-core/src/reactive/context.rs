//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when an observed value is
//! read, the current computation is linked to that value's Dep.
//!
//! # Implementation
//!
//! Each thread owns one stack of running computations. Running an effect
//! pushes an entry; the guard returned by [`ReactiveContext::enter`] pops it
//! again, also when the computation panics. Nested runs (an effect started
//! from inside another effect, or a computed read from an effect) track into
//! their own entry and hand control back to the outer one when they finish.
//!
//! A separate switch turns tracking off without leaving the current
//! computation. Sequence mutators use it so their internal reads of length
//! and indices never become dependencies.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smallvec::SmallVec;

use super::dep::Dep;
use super::SubscriberId;

/// Deps linked during one run of a computation.
pub(crate) type DepList = SmallVec<[Rc<Dep>; 8]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
    static SHOULD_TRACK: Cell<bool> = Cell::new(true);
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The subscriber ID of the running computation.
    subscriber_id: SubscriberId,
    /// Deps this run linked the subscriber into, in read order.
    dependencies: DepList,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// The context is exited when the returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: SmallVec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.subscriber_id))
    }

    /// Whether the subscriber is running anywhere on the stack.
    pub fn is_running(subscriber_id: SubscriberId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.subscriber_id == subscriber_id)
        })
    }

    /// Number of nested computations currently running.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Whether a read right now would record a dependency.
    pub fn should_track() -> bool {
        SHOULD_TRACK.with(Cell::get) && Self::is_active()
    }

    /// Link the running computation into `dep`.
    ///
    /// Returns the subscriber when a new edge was created. A subscriber that
    /// already sits in the Dep was linked earlier in the same run (edges are
    /// dropped before every run), so it is not added twice.
    pub(crate) fn track_dependency(dep: &Rc<Dep>) -> Option<SubscriberId> {
        if !SHOULD_TRACK.with(Cell::get) {
            return None;
        }

        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            if dep.subscribe(entry.subscriber_id) {
                entry.dependencies.push(Rc::clone(dep));
                Some(entry.subscriber_id)
            } else {
                None
            }
        })
    }

    /// Take the deps collected by this context so far.
    pub(crate) fn take_dependencies(&self) -> DepList {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(entry) if entry.subscriber_id == self.subscriber_id => {
                    std::mem::take(&mut entry.dependencies)
                }
                _ => SmallVec::new(),
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

/// Guard restoring the previous tracking switch when dropped.
#[must_use = "tracking is restored as soon as the guard is dropped"]
pub struct TrackingGuard {
    previous: bool,
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        let _ = SHOULD_TRACK.try_with(|flag| flag.set(self.previous));
    }
}

fn set_tracking(enabled: bool) -> TrackingGuard {
    let previous = SHOULD_TRACK.with(|flag| flag.replace(enabled));
    TrackingGuard { previous }
}

/// Stop recording dependencies until the guard is dropped.
pub fn pause_tracking() -> TrackingGuard {
    set_tracking(false)
}

/// Record dependencies again, even inside a paused region.
pub fn enable_tracking() -> TrackingGuard {
    set_tracking(true)
}

/// Run `f` without recording any dependencies.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = pause_tracking();
    f()
}
