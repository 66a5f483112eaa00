//! Effect Implementation
//!
//! An Effect is a tracked computation that re-runs whenever something it
//! read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless it is lazy).
//!
//! 2. Before every run, the effect unlinks itself from every Dep of the
//!    previous run. The run then links it again into exactly what it reads,
//!    so a branch that is no longer taken stops being a dependency.
//!
//! 3. When a dependency changes, the effect is re-run in place, or handed to
//!    its scheduler as a [`Job`] when one is configured.
//!
//! # Lifecycle
//!
//! `created -> active <-> running -> ... -> stopped`. [`Effect::stop`] is
//! terminal and idempotent. Dropping the last handle also stops the effect.
//!
//! # Cleanup
//!
//! A running effect can register cleanups with [`on_cleanup`]. They are
//! called before the effect re-runs and when it is stopped. This is useful
//! for releasing resources like listeners or timers.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::{enable_tracking, pause_tracking, DepList, ReactiveContext};
use super::dep::DepOrigin;
use super::runtime::{Reactive, Runtime, TrackKey, TrackOp, TriggerOp};
use super::subscriber::{Job, SubscriberId};
use crate::diagnostics;
use crate::error::ReactiveError;
use crate::observe::TargetId;

/// Scheduler hook: receives the job instead of the effect re-running itself.
pub type Scheduler = Rc<dyn Fn(Job)>;

/// Debug hook for track and trigger events.
pub type DebugHook = Rc<dyn Fn(&DebuggerEvent)>;

/// What a debug hook is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerEventKind {
    /// A new dependency edge was recorded.
    Track(TrackOp),
    /// A dependency changed.
    Trigger(TriggerOp),
}

/// Payload of the `on_track` / `on_trigger` hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct DebuggerEvent {
    /// The effect being told.
    pub subscriber: SubscriberId,
    /// The raw target involved, `None` for refs and computeds.
    pub target: Option<TargetId>,
    /// The key involved, `None` for refs, computeds and clears.
    pub key: Option<TrackKey>,
    /// Whether this was a track or a trigger, and of what kind.
    pub kind: DebuggerEventKind,
}

impl DebuggerEvent {
    pub(crate) fn track(subscriber: SubscriberId, origin: &DepOrigin, op: TrackOp) -> Self {
        let (target, key) = match origin {
            DepOrigin::Target { target, key } => (Some(*target), Some(key.clone())),
            DepOrigin::Cell => (None, None),
        };
        Self {
            subscriber,
            target,
            key,
            kind: DebuggerEventKind::Track(op),
        }
    }

    pub(crate) fn trigger(
        subscriber: SubscriberId,
        target: Option<TargetId>,
        key: Option<TrackKey>,
        op: TriggerOp,
    ) -> Self {
        Self {
            subscriber,
            target,
            key,
            kind: DebuggerEventKind::Trigger(op),
        }
    }
}

/// Options for [`effect_with`] and [`Effect::with_options`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    /// Called instead of re-running when a dependency changes.
    pub scheduler: Option<Scheduler>,
    /// Called whenever a new dependency edge is recorded.
    pub on_track: Option<DebugHook>,
    /// Called whenever a dependency change reaches the effect.
    pub on_trigger: Option<DebugHook>,
    /// Called once when the effect stops.
    pub on_stop: Option<Rc<dyn Fn()>>,
    /// Let the effect be notified by its own writes while running.
    pub allow_recurse: bool,
}

impl EffectOptions {
    /// Do not run on creation.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Set the scheduler hook.
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(Job) + 'static,
    {
        self.scheduler = Some(Rc::new(scheduler));
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

    /// Set the stop hook.
    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.on_stop = Some(Rc::new(hook));
        self
    }

    /// Allow self-notification.
    pub fn allow_recurse(mut self) -> Self {
        self.allow_recurse = true;
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("allow_recurse", &self.allow_recurse)
            .finish()
    }
}

pub(crate) struct EffectInner<T> {
    id: SubscriberId,
    body: Box<dyn Fn() -> T>,
    deps: RefCell<DepList>,
    active: Cell<bool>,
    computed: Cell<bool>,
    run_count: Cell<usize>,
    last_run: Cell<u64>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    options: EffectOptions,
}

/// Moves the deps collected during a run into the effect, on every exit path.
///
/// An effect stopped by its own body keeps none of them.
struct RunScope<'a, T> {
    effect: &'a EffectInner<T>,
    ctx: ReactiveContext,
}

impl<T> Drop for RunScope<'_, T> {
    fn drop(&mut self) {
        let deps = self.ctx.take_dependencies();
        if self.effect.active.get() {
            *self.effect.deps.borrow_mut() = deps;
        } else {
            for dep in deps {
                dep.unsubscribe(self.effect.id);
            }
        }
    }
}

impl<T> EffectInner<T> {
    fn run(&self) -> Option<T> {
        if !self.active.get() {
            let _untracked = pause_tracking();
            return Some((self.body)());
        }

        // Already running further up the stack.
        if ReactiveContext::is_running(self.id) {
            tracing::trace!(subscriber = %self.id, "skipped recursive run");
            return None;
        }

        self.run_cleanups();
        self.detach();
        self.last_run.set(Runtime::next_run_stamp());

        let _tracking = enable_tracking();
        let scope = RunScope {
            effect: self,
            ctx: ReactiveContext::enter(self.id),
        };
        let value = (self.body)();
        drop(scope);

        self.run_count.set(self.run_count.get() + 1);
        Some(value)
    }

    fn detach(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            dep.unsubscribe(self.id);
        }
    }

    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }

    fn stop(&self) {
        if !self.active.replace(false) {
            return;
        }
        self.detach();
        self.run_cleanups();
        if let Some(on_stop) = &self.options.on_stop {
            on_stop();
        }
        tracing::debug!(subscriber = %self.id, runs = self.run_count.get(), "effect stopped");
    }
}

impl<T> Reactive for EffectInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn allows_recurse(&self) -> bool {
        self.options.allow_recurse
    }

    fn is_computed(&self) -> bool {
        self.computed.get()
    }

    fn last_run(&self) -> u64 {
        self.last_run.get()
    }

    fn notify(&self, event: &DebuggerEvent, job: Job) {
        if let Some(on_trigger) = &self.options.on_trigger {
            on_trigger(event);
        }
        match &self.options.scheduler {
            Some(scheduler) => scheduler(job),
            None => {
                self.run();
            }
        }
    }

    fn execute(&self) {
        self.run();
    }

    fn tracked(&self, event: &DebuggerEvent) {
        if let Some(on_track) = &self.options.on_track {
            on_track(event);
        }
    }

    fn add_cleanup(&self, cleanup: Box<dyn FnOnce()>) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        self.stop();
        Runtime::unregister(self.id);
    }
}

/// A tracked computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let c = count.clone();
/// let _effect = effect(move || println!("Count is: {}", c.get()));
///
/// count.set(5); // Prints: "Count is: 5"
/// ```
pub struct Effect<T: 'static> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create a new effect and run it immediately.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(body, EffectOptions::default())
    }

    /// Create a new effect without running it.
    pub fn new_lazy<F>(body: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(body, EffectOptions::default().lazy())
    }

    /// Create a new effect with the given options.
    pub fn with_options<F>(body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let lazy = options.lazy;
        let inner = Rc::new(EffectInner {
            id: SubscriberId::new(),
            body: Box::new(body),
            deps: RefCell::new(DepList::new()),
            active: Cell::new(true),
            computed: Cell::new(false),
            run_count: Cell::new(0),
            last_run: Cell::new(0),
            cleanups: RefCell::new(Vec::new()),
            options,
        });

        let weak: Weak<EffectInner<T>> = Rc::downgrade(&inner);
        Runtime::register(weak, inner.id);

        let effect = Self { inner };
        if !lazy {
            effect.run();
        }
        effect
    }

    /// Get the effect's subscriber ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the effect now, re-linking its dependencies.
    ///
    /// A stopped effect runs its body without tracking anything. Returns
    /// `None` only when the effect is already running further up the stack.
    pub fn run(&self) -> Option<T> {
        self.inner.run()
    }

    /// Unlink the effect from everything and stop it for good.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Whether the effect still reacts to changes.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of Deps the effect is linked into.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Mark this effect as the one backing a computed, so it is notified
    /// ahead of plain effects.
    pub(crate) fn mark_computed(&self) {
        self.inner.computed.set(true);
    }

    pub(crate) fn as_reactive(&self) -> Rc<dyn Reactive> {
        self.inner.clone()
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Create an effect and run it immediately.
pub fn effect<T, F>(body: F) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Effect::new(body)
}

/// Create an effect with options.
pub fn effect_with<T, F>(body: F, options: EffectOptions) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Effect::with_options(body, options)
}

/// Register a cleanup for the currently running effect.
///
/// Outside of a running effect this is a usage warning and does nothing.
pub fn on_cleanup<F>(cleanup: F) -> Result<(), ReactiveError>
where
    F: FnOnce() + 'static,
{
    match Runtime::current_reactive() {
        Some(reactive) => {
            reactive.add_cleanup(Box::new(cleanup));
            Ok(())
        }
        None => Err(diagnostics::report(ReactiveError::NoActiveEffect("on_cleanup"))),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Ref;

    fn counter() -> (Rc<Cell<i32>>, Rc<Cell<i32>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn effect_runs_on_creation() {
        let (runs, runs_clone) = counter();

        let _effect = Effect::new(move || runs_clone.set(runs_clone.get() + 1));

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let (runs, runs_clone) = counter();

        let effect = Effect::new_lazy(move || runs_clone.set(runs_clone.get() + 1));

        assert_eq!(runs.get(), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually run
        effect.run();
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_returns_body_result() {
        let effect = Effect::new_lazy(|| 7);
        assert_eq!(effect.run(), Some(7));
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let source = Ref::new(1);
        let seen = Rc::new(Cell::new(0));

        let (s, out) = (source.clone(), seen.clone());
        let _effect = effect(move || out.set(s.get()));
        assert_eq!(seen.get(), 1);

        source.set(2);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn conditional_dependencies_are_dropped() {
        let flag = Ref::new(true);
        let left = Ref::new(1);
        let (runs, runs_clone) = counter();

        let (f, l) = (flag.clone(), left.clone());
        let effect = effect(move || {
            runs_clone.set(runs_clone.get() + 1);
            if f.get() {
                l.get();
            }
        });
        assert_eq!(effect.dependency_count(), 2);

        flag.set(false);
        assert_eq!(runs.get(), 2);
        assert_eq!(effect.dependency_count(), 1);

        // No longer read, so no longer a dependency.
        left.set(10);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn stopped_effect_does_not_react() {
        let source = Ref::new(0);
        let (runs, runs_clone) = counter();

        let s = source.clone();
        let effect = effect(move || {
            s.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        effect.stop();
        effect.stop();
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(source.subscriber_count(), 0);

        source.set(1);
        assert_eq!(runs.get(), 1);

        // A manual run still executes, but tracks nothing.
        effect.run();
        assert_eq!(runs.get(), 2);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn effect_stopping_itself_releases_new_edges() {
        let source = Ref::new(0);
        let (runs, runs_clone) = counter();
        let handle: Rc<RefCell<Option<Effect<()>>>> = Rc::default();

        let (s, h) = (source.clone(), handle.clone());
        let effect = effect(move || {
            runs_clone.set(runs_clone.get() + 1);
            s.get();
            if runs_clone.get() == 2 {
                if let Some(me) = h.borrow().as_ref() {
                    me.stop();
                }
            }
        });
        *handle.borrow_mut() = Some(effect.clone());

        source.set(1);
        assert_eq!(runs.get(), 2);
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(source.subscriber_count(), 0);

        source.set(2);
        assert_eq!(runs.get(), 2);
        handle.borrow_mut().take();
    }

    #[test]
    fn scheduler_replaces_rerun() {
        let source = Ref::new(0);
        let (runs, runs_clone) = counter();
        let jobs: Rc<RefCell<Vec<Job>>> = Rc::default();

        let s = source.clone();
        let queue = jobs.clone();
        let _effect = effect_with(
            move || {
                s.get();
                runs_clone.set(runs_clone.get() + 1);
            },
            EffectOptions::default().scheduler(move |job| queue.borrow_mut().push(job)),
        );

        source.set(1);
        source.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(jobs.borrow().len(), 2);

        let pending: Vec<Job> = jobs.borrow_mut().drain(..).collect();
        pending[0].run();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn nested_effects_track_independently() {
        let outer_source = Ref::new(0);
        let inner_source = Ref::new(0);
        let (outer_runs, outer_clone) = counter();
        let (inner_runs, inner_clone) = counter();
        let inner_slot: Rc<RefCell<Option<Effect<()>>>> = Rc::default();

        let (o, i, slot) = (outer_source.clone(), inner_source.clone(), inner_slot.clone());
        let _outer = effect(move || {
            outer_clone.set(outer_clone.get() + 1);
            let (i, inner_clone) = (i.clone(), inner_clone.clone());
            *slot.borrow_mut() = Some(effect(move || {
                inner_clone.set(inner_clone.get() + 1);
                i.get();
            }));
            o.get();
        });
        assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));

        inner_source.set(1);
        assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

        outer_source.set(1);
        assert_eq!((outer_runs.get(), inner_runs.get()), (2, 3));
    }

    #[test]
    fn self_write_does_not_loop() {
        let source = Ref::new(0);
        let (runs, runs_clone) = counter();

        let s = source.clone();
        let _effect = effect(move || {
            runs_clone.set(runs_clone.get() + 1);
            s.set(s.get() + 1);
        });

        assert_eq!(runs.get(), 1);
        assert_eq!(source.get_untracked(), 1);
    }

    #[test]
    fn debug_hooks_fire() {
        let source = Ref::new(0);
        let tracks = Rc::new(Cell::new(0));
        let triggers = Rc::new(Cell::new(0));

        let (s, t, g) = (source.clone(), tracks.clone(), triggers.clone());
        let _effect = effect_with(
            move || {
                s.get();
                s.get();
            },
            EffectOptions::default()
                .on_track(move |event| {
                    assert_eq!(event.kind, DebuggerEventKind::Track(TrackOp::Get));
                    t.set(t.get() + 1);
                })
                .on_trigger(move |event| {
                    assert_eq!(event.kind, DebuggerEventKind::Trigger(TriggerOp::Set));
                    g.set(g.get() + 1);
                }),
        );
        // Two reads of one source are one edge.
        assert_eq!(tracks.get(), 1);

        source.set(1);
        assert_eq!(triggers.get(), 1);
        assert_eq!(tracks.get(), 2);
    }

    #[test]
    fn cleanups_run_before_rerun_and_on_stop() {
        let source = Ref::new(0);
        let (cleaned, cleaned_clone) = counter();

        let s = source.clone();
        let effect = effect(move || {
            s.get();
            let c = cleaned_clone.clone();
            on_cleanup(move || c.set(c.get() + 1)).unwrap();
        });
        assert_eq!(cleaned.get(), 0);

        source.set(1);
        assert_eq!(cleaned.get(), 1);

        effect.stop();
        assert_eq!(cleaned.get(), 2);
    }

    #[test]
    fn on_cleanup_outside_effect_is_rejected() {
        assert_eq!(
            on_cleanup(|| {}),
            Err(ReactiveError::NoActiveEffect("on_cleanup"))
        );
    }

    #[test]
    fn on_stop_fires_once() {
        let (stops, stops_clone) = counter();
        let effect = effect_with(
            || (),
            EffectOptions::default().on_stop(move || stops_clone.set(stops_clone.get() + 1)),
        );

        effect.stop();
        effect.stop();
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn dropping_last_handle_stops_effect() {
        let source = Ref::new(0);
        let (runs, runs_clone) = counter();

        let s = source.clone();
        let effect = effect(move || {
            s.get();
            runs_clone.set(runs_clone.get() + 1);
        });
        let clone = effect.clone();
        drop(effect);

        source.set(1);
        assert_eq!(runs.get(), 2);

        drop(clone);
        source.set(2);
        assert_eq!(runs.get(), 2);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn panicking_body_restores_context() {
        let source = Ref::new(0);
        let s = source.clone();
        let effect = Effect::new_lazy(move || {
            s.get();
            panic!("boom");
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| effect.run()));
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
        // The edge made before the panic is still owned by the effect.
        assert_eq!(effect.dependency_count(), 1);

        effect.stop();
        assert_eq!(source.subscriber_count(), 0);
    }
}
