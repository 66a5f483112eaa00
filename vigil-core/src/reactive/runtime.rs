//! Reactive Runtime
//!
//! The runtime is the dependency store: it maps every observed
//! `(target, key)` pair to the Dep of computations that read it, and turns
//! writes into notifications.
//!
//! # How It Works
//!
//! 1. A read inside a running effect calls [`Runtime::track`]. The Dep for
//!    the pair is fetched or created and linked both ways with the effect.
//!
//! 2. A write calls [`Runtime::trigger`] (or [`Runtime::trigger_all`] for a
//!    mutation that touches several keys). The runtime:
//!    a. Picks every Dep the change affects, following the per-kind rules
//!       in `collect_deps`
//!    b. Unions their subscribers into one ordered queue, so a computation
//!       reachable through several keys is notified once
//!    c. Hands each one to its scheduler, or re-runs it in place
//!
//! # Thread Safety
//!
//! Everything here is per thread. Reactive handles are `!Send`, so a store
//! is only ever reached from the thread that created its targets.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Range;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::dep::{Dep, DepOrigin};
use super::effect::DebuggerEvent;
use super::subscriber::{Job, SubscriberId};
use crate::observe::{PropKey, TargetId, TargetKind, Value};

/// A trait for tracked computations the runtime can notify.
pub trait Reactive {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// Whether the computation still reacts to changes.
    fn is_active(&self) -> bool;

    /// Whether the computation may be notified by its own writes.
    fn allows_recurse(&self) -> bool;

    /// Whether this computation backs a computed value.
    fn is_computed(&self) -> bool;

    /// Stamp taken when the last tracked run started, `0` if it never ran.
    fn last_run(&self) -> u64;

    /// React to a change: run the scheduler if one is configured, else re-run.
    fn notify(&self, event: &DebuggerEvent, job: Job);

    /// Re-run the computation, discarding its result.
    fn execute(&self);

    /// Called after a new dependency edge was recorded.
    fn tracked(&self, event: &DebuggerEvent);

    /// Register a cleanup to call before the next run or on stop.
    fn add_cleanup(&self, cleanup: Box<dyn FnOnce()>);
}

/// The key under which a read is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// A record property or sequence element (including `"length"`).
    Prop(PropKey),
    /// An existence check on a record or sequence key.
    Has(PropKey),
    /// A map or set entry.
    Entry(Value),
    /// Enumeration of a target's entries.
    Iterate,
    /// Enumeration of a map's keys only.
    KeyIterate,
    /// The size of a map or set.
    Size,
}

impl TrackKey {
    /// Key for a sequence index.
    pub fn index(index: usize) -> Self {
        Self::Prop(PropKey::from(index))
    }

    /// Key for a sequence's length.
    pub fn length() -> Self {
        Self::Prop(PropKey::length())
    }
}

/// Kind of read being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    /// A value read.
    Get,
    /// An existence check.
    Has,
    /// An enumeration.
    Iterate,
}

/// Kind of change being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing key got a new value.
    Set,
    /// A key that did not exist was added.
    Add,
    /// A key was removed.
    Delete,
    /// Every entry was removed.
    Clear,
}

/// One change to a target, as fed to [`Runtime::trigger_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// What happened.
    pub op: TriggerOp,
    /// Which key it happened to. `None` for [`TriggerOp::Clear`].
    pub key: Option<TrackKey>,
    /// The new length, when a sequence's length was set explicitly.
    pub new_length: Option<usize>,
    /// Sequence indices that came into existence as `Undefined` holes.
    pub filled: Option<Range<usize>>,
}

impl Trigger {
    /// An existing key changed value.
    pub fn set(key: TrackKey) -> Self {
        Self { op: TriggerOp::Set, key: Some(key), new_length: None, filled: None }
    }

    /// A new key was added.
    pub fn add(key: TrackKey) -> Self {
        Self { op: TriggerOp::Add, key: Some(key), new_length: None, filled: None }
    }

    /// A key was removed.
    pub fn delete(key: TrackKey) -> Self {
        Self { op: TriggerOp::Delete, key: Some(key), new_length: None, filled: None }
    }

    /// All entries were removed.
    pub fn clear() -> Self {
        Self { op: TriggerOp::Clear, key: None, new_length: None, filled: None }
    }

    /// A sequence's length was set to `new_length`.
    pub fn length(new_length: usize) -> Self {
        Self {
            op: TriggerOp::Set,
            key: Some(TrackKey::length()),
            new_length: Some(new_length),
            filled: None,
        }
    }

    /// A sequence grew over `indices` without values being written there.
    pub fn fill(indices: Range<usize>) -> Self {
        Self {
            op: TriggerOp::Add,
            key: None,
            new_length: None,
            filled: Some(indices),
        }
    }
}

type DepsMap = IndexMap<TrackKey, Rc<Dep>>;

thread_local! {
    // Maps subscriber IDs to weak references so edges never keep effects alive.
    static REGISTRY: RefCell<HashMap<SubscriberId, Weak<dyn Reactive>>> =
        RefCell::new(HashMap::new());
    static TARGET_DEPS: RefCell<HashMap<TargetId, DepsMap>> = RefCell::new(HashMap::new());
    static RUN_STAMP: Cell<u64> = const { Cell::new(0) };
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a computation so triggers can reach it.
    pub(crate) fn register(reactive: Weak<dyn Reactive>, id: SubscriberId) {
        REGISTRY.with(|registry| {
            registry.borrow_mut().insert(id, reactive);
        });
    }

    /// Unregister a computation.
    pub(crate) fn unregister(id: SubscriberId) {
        let _ = REGISTRY.try_with(|registry| registry.borrow_mut().remove(&id));
    }

    /// Stamp a tracked run that is about to start.
    pub(crate) fn next_run_stamp() -> u64 {
        RUN_STAMP.with(|stamp| {
            let next = stamp.get() + 1;
            stamp.set(next);
            next
        })
    }

    fn lookup(id: SubscriberId) -> Option<Rc<dyn Reactive>> {
        REGISTRY.with(|registry| registry.borrow().get(&id).and_then(Weak::upgrade))
    }

    /// The computation currently collecting dependencies, if any.
    pub(crate) fn current_reactive() -> Option<Rc<dyn Reactive>> {
        ReactiveContext::current_subscriber().and_then(Self::lookup)
    }

    /// Drop every Dep recorded for a target that no longer exists.
    pub(crate) fn forget_target(target: TargetId) {
        // Dropping the map can drop keys holding other targets, whose own
        // teardown re-enters this function, so release the borrow first.
        let removed = TARGET_DEPS.try_with(|deps| deps.borrow_mut().remove(&target));
        drop(removed);
    }

    /// Record a read of `key` on `target` by the running computation.
    ///
    /// A no-op when nothing is running or tracking is paused.
    pub fn track(target: TargetId, op: TrackOp, key: TrackKey) {
        if !ReactiveContext::should_track() {
            return;
        }

        let dep = TARGET_DEPS.with(|deps| {
            let mut deps = deps.borrow_mut();
            Rc::clone(
                deps.entry(target)
                    .or_default()
                    .entry(key.clone())
                    .or_insert_with(|| Dep::new(DepOrigin::Target { target, key })),
            )
        });
        Self::track_dep(&dep, op);
    }

    /// Record a read of a standalone Dep (a `Ref` or `Computed`).
    pub(crate) fn track_dep(dep: &Rc<Dep>, op: TrackOp) {
        let Some(subscriber) = ReactiveContext::track_dependency(dep) else {
            return;
        };

        tracing::trace!(%subscriber, origin = ?dep.origin(), "tracked");
        if let Some(reactive) = Self::lookup(subscriber) {
            reactive.tracked(&DebuggerEvent::track(subscriber, dep.origin(), op));
        }
    }

    /// Publish one change to `target`.
    pub fn trigger(target: TargetId, kind: TargetKind, trigger: Trigger) {
        Self::trigger_all(target, kind, std::slice::from_ref(&trigger));
    }

    /// Publish every change of one mutation as a single notification pass.
    ///
    /// Subscribers are deduplicated across all changes and notified in the
    /// order they were first reached.
    pub fn trigger_all(target: TargetId, kind: TargetKind, triggers: &[Trigger]) {
        let mut queue: IndexMap<SubscriberId, DebuggerEvent> = IndexMap::new();

        TARGET_DEPS.with(|deps| {
            let deps = deps.borrow();
            let Some(deps_map) = deps.get(&target) else {
                return;
            };

            for trigger in triggers {
                let mut hit: SmallVec<[&Rc<Dep>; 4]> = SmallVec::new();
                collect_deps(deps_map, kind, trigger, &mut hit);
                for dep in hit {
                    for id in dep.subscriber_ids() {
                        queue.entry(id).or_insert_with(|| {
                            let key = trigger.key.clone();
                            DebuggerEvent::trigger(id, Some(target), key, trigger.op)
                        });
                    }
                }
            }
        });

        tracing::trace!(%target, changes = triggers.len(), notified = queue.len(), "triggered");
        Self::notify_queue(queue);
    }

    /// Publish a change of a standalone Dep.
    pub(crate) fn trigger_dep(dep: &Rc<Dep>, op: TriggerOp) {
        let queue: IndexMap<SubscriberId, DebuggerEvent> = dep
            .subscriber_ids()
            .into_iter()
            .map(|id| (id, DebuggerEvent::trigger(id, None, None, op)))
            .collect();
        Self::notify_queue(queue);
    }

    fn notify_queue(queue: IndexMap<SubscriberId, DebuggerEvent>) {
        if queue.is_empty() {
            return;
        }

        let pass_start = RUN_STAMP.with(Cell::get);

        // Resolve everything before running anything: a re-run may register,
        // drop, or re-link subscribers.
        let mut reactives: Vec<(Rc<dyn Reactive>, DebuggerEvent)> = REGISTRY.with(|registry| {
            let registry = registry.borrow();
            queue
                .into_iter()
                .filter_map(|(id, event)| {
                    registry
                        .get(&id)
                        .and_then(Weak::upgrade)
                        .map(|reactive| (reactive, event))
                })
                .collect()
        });
        // Computeds go first so plain effects read fresh cached values.
        reactives.sort_by_key(|(reactive, _)| !reactive.is_computed());

        let running = ReactiveContext::current_subscriber();
        for (reactive, event) in reactives {
            if Some(reactive.subscriber_id()) == running && !reactive.allows_recurse() {
                continue;
            }
            // Stopped by an earlier subscriber in this same pass.
            if !reactive.is_active() {
                continue;
            }
            // Already re-ran after this change, through a computed it reads.
            if !reactive.is_computed() && reactive.last_run() > pass_start {
                continue;
            }
            let job = Job::new(&reactive);
            reactive.notify(&event, job);
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if a read right now would be tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::should_track()
    }

    /// Number of computations linked to `key` on `target`.
    pub fn subscriber_count(target: TargetId, key: &TrackKey) -> usize {
        TARGET_DEPS.with(|deps| {
            deps.borrow()
                .get(&target)
                .and_then(|deps_map| deps_map.get(key))
                .map(|dep| dep.len())
                .unwrap_or(0)
        })
    }

    /// Whether the store still holds Deps for `target`.
    pub fn has_deps(target: TargetId) -> bool {
        TARGET_DEPS.with(|deps| deps.borrow().contains_key(&target))
    }
}

/// Pick the Deps a change affects.
fn collect_deps<'a>(
    deps: &'a DepsMap,
    kind: TargetKind,
    trigger: &Trigger,
    out: &mut SmallVec<[&'a Rc<Dep>; 4]>,
) {
    if trigger.op == TriggerOp::Clear {
        // Every key of the collection changed.
        out.extend(deps.values());
        return;
    }

    if let Some(filled) = &trigger.filled {
        // Holes only change existence checks; reads still see `Undefined`.
        for (key, dep) in deps {
            if let TrackKey::Has(prop) = key {
                if prop.as_index().is_some_and(|i| filled.contains(&i)) {
                    out.push(dep);
                }
            }
        }
        return;
    }

    if let (TargetKind::Sequence, Some(new_length)) = (kind, trigger.new_length) {
        // Truncation: length plus every index that fell off the end.
        for (key, dep) in deps {
            match key {
                TrackKey::Prop(prop) if prop.is_length() => out.push(dep),
                TrackKey::Prop(prop) | TrackKey::Has(prop)
                    if prop.as_index().is_some_and(|i| i >= new_length) =>
                {
                    out.push(dep)
                }
                _ => {}
            }
        }
        return;
    }

    let prop = match &trigger.key {
        Some(TrackKey::Prop(prop)) => Some(prop),
        _ => None,
    };

    let mut push = move |key: &TrackKey| {
        if let Some(dep) = deps.get(key) {
            out.push(dep);
        }
    };

    if let Some(key) = &trigger.key {
        push(key);
    }

    match (trigger.op, kind) {
        (TriggerOp::Add, TargetKind::Record) => {
            push(&TrackKey::Iterate);
            if let Some(prop) = prop {
                push(&TrackKey::Has(prop.clone()));
            }
        }
        (TriggerOp::Add, TargetKind::Sequence) => {
            if let Some(prop) = prop {
                if prop.as_index().is_some() {
                    push(&TrackKey::length());
                }
                push(&TrackKey::Has(prop.clone()));
            }
        }
        (TriggerOp::Delete, TargetKind::Record | TargetKind::Sequence) => {
            push(&TrackKey::Iterate);
            if let Some(prop) = prop {
                push(&TrackKey::Has(prop.clone()));
            }
        }
        (TriggerOp::Add | TriggerOp::Delete, TargetKind::Map) => {
            push(&TrackKey::Iterate);
            push(&TrackKey::KeyIterate);
            push(&TrackKey::Size);
        }
        (TriggerOp::Add | TriggerOp::Delete, TargetKind::Set) => {
            push(&TrackKey::Iterate);
            push(&TrackKey::Size);
        }
        (TriggerOp::Set, TargetKind::Map) => push(&TrackKey::Iterate),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps_for(keys: &[TrackKey]) -> DepsMap {
        keys.iter()
            .map(|key| (key.clone(), Dep::cell()))
            .collect()
    }

    fn collected(deps: &DepsMap, kind: TargetKind, trigger: Trigger) -> Vec<TrackKey> {
        let mut out = SmallVec::new();
        collect_deps(deps, kind, &trigger, &mut out);
        out.into_iter()
            .map(|dep| {
                deps.iter()
                    .find(|(_, d)| Rc::ptr_eq(d, dep))
                    .map(|(k, _)| k.clone())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn record_add_notifies_iteration() {
        let deps = deps_for(&[
            TrackKey::Prop("a".into()),
            TrackKey::Iterate,
            TrackKey::Has("a".into()),
        ]);

        let hit = collected(&deps, TargetKind::Record, Trigger::add(TrackKey::Prop("a".into())));
        assert_eq!(hit.len(), 3);

        let hit = collected(&deps, TargetKind::Record, Trigger::set(TrackKey::Prop("a".into())));
        assert_eq!(hit, vec![TrackKey::Prop("a".into())]);
    }

    #[test]
    fn sequence_truncation_hits_trailing_indices() {
        let deps = deps_for(&[
            TrackKey::index(0),
            TrackKey::index(1),
            TrackKey::index(2),
            TrackKey::length(),
        ]);

        let hit = collected(&deps, TargetKind::Sequence, Trigger::length(1));
        assert_eq!(hit, vec![TrackKey::index(1), TrackKey::index(2), TrackKey::length()]);
    }

    #[test]
    fn sequence_fill_hits_existence_checks_in_range() {
        let deps = deps_for(&[
            TrackKey::index(1),
            TrackKey::Has(PropKey::from(1usize)),
            TrackKey::Has(PropKey::from(2usize)),
            TrackKey::Has(PropKey::from(3usize)),
            TrackKey::length(),
        ]);

        let hit = collected(&deps, TargetKind::Sequence, Trigger::fill(1..3));
        assert_eq!(
            hit,
            vec![
                TrackKey::Has(PropKey::from(1usize)),
                TrackKey::Has(PropKey::from(2usize)),
            ]
        );
    }

    #[test]
    fn sequence_delete_skips_length() {
        let deps = deps_for(&[TrackKey::index(1), TrackKey::length(), TrackKey::Iterate]);

        let hit = collected(&deps, TargetKind::Sequence, Trigger::delete(TrackKey::index(1)));
        assert_eq!(hit, vec![TrackKey::index(1), TrackKey::Iterate]);
    }

    #[test]
    fn sequence_add_of_non_index_skips_length() {
        let deps = deps_for(&[TrackKey::Prop("x".into()), TrackKey::length()]);

        let hit = collected(&deps, TargetKind::Sequence, Trigger::add(TrackKey::Prop("x".into())));
        assert_eq!(hit, vec![TrackKey::Prop("x".into())]);

        let hit = collected(&deps, TargetKind::Sequence, Trigger::add(TrackKey::Prop("-1".into())));
        assert!(hit.is_empty());
    }

    #[test]
    fn collection_changes_hit_size() {
        let deps = deps_for(&[TrackKey::Size, TrackKey::Iterate, TrackKey::KeyIterate]);

        let hit = collected(&deps, TargetKind::Set, Trigger::add(TrackKey::Entry(Value::from(1))));
        assert_eq!(hit, vec![TrackKey::Iterate, TrackKey::Size]);

        let hit = collected(&deps, TargetKind::Map, Trigger::set(TrackKey::Entry(Value::from(1))));
        assert_eq!(hit, vec![TrackKey::Iterate]);

        let hit = collected(&deps, TargetKind::Map, Trigger::clear());
        assert_eq!(hit.len(), 3);
    }

    #[test]
    fn track_outside_context_records_nothing() {
        let target = TargetId::new();
        Runtime::track(target, TrackOp::Get, TrackKey::Prop("a".into()));
        assert!(!Runtime::has_deps(target));
    }
}
