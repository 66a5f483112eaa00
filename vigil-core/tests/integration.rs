//! Integration Tests for the Reactive System
//!
//! These tests verify that observed containers, refs, computeds and effects
//! work together correctly.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vigil_core::diagnostics::{set_warn_handler, take_warn_handler};
use vigil_core::observe::{
    is_observed, observe_value, reactive, readonly, to_raw, Mode, Target, Value,
};
use vigil_core::reactive::{
    computed, effect, effect_with, writable_computed, ComputedState, EffectOptions, Job,
    ReactiveContext, Ref, RefLike, SubscriberId,
};
use vigil_core::ReactiveError;

fn number(value: Value) -> f64 {
    value.as_number().unwrap_or(f64::NAN)
}

/// Test that a computed tracks an observed record automatically.
#[test]
fn computed_tracks_record_dependency() {
    let state = reactive(&Target::record_from([("count", 10)]));

    let s = state.clone();
    let doubled = computed(move || number(s.get("count")) * 2.0);

    // First access computes the value
    assert_eq!(doubled.get(), 20.0);

    // No manual invalidation: the write marks the computed dirty
    state.set("count", 5).unwrap();
    assert_eq!(doubled.state(), ComputedState::Dirty);
    assert_eq!(doubled.get(), 10.0);
}

/// Test that an effect re-runs when a record it read changes.
#[test]
fn effect_tracks_record_dependency() {
    let state = reactive(&Target::record_from([("value", 0)]));
    let observed_value = Rc::new(RefCell::new(Value::Undefined));

    let (s, out) = (state.clone(), observed_value.clone());
    let _effect = effect(move || *out.borrow_mut() = s.get("value"));

    // Effect runs on creation, captures initial value
    assert_eq!(*observed_value.borrow(), Value::from(0));

    state.set("value", 42).unwrap();
    assert_eq!(*observed_value.borrow(), Value::from(42));
}

/// Test that a computed runs at most once per batch of changes, and never
/// when it is not read.
#[test]
fn computed_is_lazy_across_batches() {
    let compute_count = Arc::new(AtomicUsize::new(0));
    let compute_clone = compute_count.clone();
    let source = Ref::new(1);

    let s = source.clone();
    let squared = computed(move || {
        compute_clone.fetch_add(1, Ordering::SeqCst);
        s.get() * s.get()
    });

    // Nothing read yet
    source.set(2);
    source.set(3);
    assert_eq!(compute_count.load(Ordering::SeqCst), 0);

    assert_eq!(squared.get(), 9);
    assert_eq!(squared.get(), 9);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    // A batch of three changes, one recompute
    source.set(4);
    source.set(5);
    source.set(6);
    assert_eq!(squared.get(), 36);
    assert_eq!(compute_count.load(Ordering::SeqCst), 2);
}

/// Test that computeds can depend on other computeds.
#[test]
fn computed_depends_on_computed() {
    let base = Ref::new(5);

    let b = base.clone();
    let doubled = computed(move || b.get() * 2);

    let d = doubled.clone();
    let plus_ten = computed(move || d.get() + 10);

    // Initial values
    assert_eq!(doubled.get(), 10);
    assert_eq!(plus_ten.get(), 20);

    // Both become dirty through the chain
    base.set(10);
    assert_eq!(plus_ten.state(), ComputedState::Dirty);

    assert_eq!(plus_ten.get(), 30);
    assert_eq!(doubled.get(), 20);
}

/// Test that a getter-only computed rejects writes without touching its
/// cache, and reports the rejection.
#[test]
fn readonly_computed_write_is_reported() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let w = warnings.clone();
    set_warn_handler(move |error| {
        assert_eq!(*error, ReactiveError::ReadonlyComputed);
        w.fetch_add(1, Ordering::SeqCst);
    });

    let constant = computed(|| 7);
    assert_eq!(constant.get(), 7);
    assert!(RefLike::try_set(&constant, 1).is_err());
    assert_eq!(constant.get(), 7);
    assert_eq!(warnings.load(Ordering::SeqCst), 1);

    take_warn_handler();
}

/// Test that a writable computed delegates to its setter.
#[test]
fn writable_computed_updates_its_source() {
    let state = reactive(&Target::record_from([("first", "Ada"), ("last", "Lovelace")]));

    let (get_state, set_state) = (state.clone(), state.clone());
    let full_name = writable_computed(
        move || format!("{} {}", get_state.get("first"), get_state.get("last")),
        move |name: String| {
            let mut parts = name.splitn(2, ' ');
            let first = parts.next().unwrap_or_default().to_string();
            let last = parts.next().unwrap_or_default().to_string();
            set_state.set("first", first).unwrap();
            set_state.set("last", last).unwrap();
        },
    );

    assert_eq!(full_name.get(), "Ada Lovelace");
    full_name.set("Grace Hopper".to_string()).unwrap();
    assert_eq!(state.get("first"), Value::from("Grace"));
    assert_eq!(full_name.get(), "Grace Hopper");
}

/// Test that stopping an effect stops execution.
#[test]
fn stopped_effect_does_not_run() {
    let run_count = Arc::new(AtomicUsize::new(0));
    let run_clone = run_count.clone();
    let state = reactive(&Target::record_from([("n", 0)]));

    let s = state.clone();
    let effect = effect(move || {
        s.get("n");
        run_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Ran once on creation
    assert_eq!(run_count.load(Ordering::SeqCst), 1);

    effect.stop();

    // Further writes should not run it
    state.set("n", 1).unwrap();
    state.set("n", 2).unwrap();
    state.set("n", 3).unwrap();

    assert_eq!(run_count.load(Ordering::SeqCst), 1);
}

/// Test that ReactiveContext correctly tracks nested computations.
#[test]
fn nested_reactive_contexts() {
    let outer_id = SubscriberId::new();
    let inner_id = SubscriberId::new();

    let _outer_ctx = ReactiveContext::enter(outer_id);
    {
        let _inner_ctx = ReactiveContext::enter(inner_id);
        assert_eq!(ReactiveContext::current_subscriber(), Some(inner_id));
        assert!(ReactiveContext::is_running(outer_id));
    }

    // Back to the outer context
    assert_eq!(ReactiveContext::current_subscriber(), Some(outer_id));
    assert_eq!(ReactiveContext::depth(), 1);
}

/// Test that an effect only depends on the branch it took last.
#[test]
fn branch_switch_drops_stale_dependencies() {
    let state = reactive(&Target::record_from([
        ("show", Value::from(true)),
        ("a", Value::from(1)),
        ("b", Value::from(2)),
    ]));
    let run_count = Arc::new(AtomicUsize::new(0));

    let (s, runs) = (state.clone(), run_count.clone());
    let _effect = effect(move || {
        runs.fetch_add(1, Ordering::SeqCst);
        if s.get("show") == Value::from(true) {
            s.get("a");
        } else {
            s.get("b");
        }
    });

    state.set("show", false).unwrap();
    assert_eq!(run_count.load(Ordering::SeqCst), 2);

    // "a" is no longer read
    state.set("a", 10).unwrap();
    assert_eq!(run_count.load(Ordering::SeqCst), 2);

    state.set("b", 20).unwrap();
    assert_eq!(run_count.load(Ordering::SeqCst), 3);
}

/// Test that a scheduler can defer and batch re-runs.
#[test]
fn scheduler_batches_reruns() {
    let state = reactive(&Target::record_from([("a", 0), ("b", 0)]));
    let run_count = Arc::new(AtomicUsize::new(0));
    let queue: Rc<RefCell<Vec<Job>>> = Rc::default();

    let (s, runs, q) = (state.clone(), run_count.clone(), queue.clone());
    let _effect = effect_with(
        move || {
            s.get("a");
            s.get("b");
            runs.fetch_add(1, Ordering::SeqCst);
        },
        EffectOptions::default().scheduler(move |job| {
            let mut pending = q.borrow_mut();
            if !pending.iter().any(|queued| queued.id() == job.id()) {
                pending.push(job);
            }
        }),
    );

    state.set("a", 1).unwrap();
    state.set("b", 1).unwrap();
    state.set("a", 2).unwrap();
    assert_eq!(run_count.load(Ordering::SeqCst), 1);

    let jobs: Vec<Job> = queue.borrow_mut().drain(..).collect();
    assert_eq!(jobs.len(), 1);
    for job in jobs {
        job.run();
    }
    assert_eq!(run_count.load(Ordering::SeqCst), 2);
}

/// Test the complete chain: record -> computed -> effect.
#[test]
fn full_reactive_chain() {
    let cart = reactive(&Target::record_from([("price", 3), ("quantity", 2)]));
    let totals = Rc::new(RefCell::new(Vec::new()));

    let c = cart.clone();
    let total = computed(move || number(c.get("price")) * number(c.get("quantity")));

    let (t, out) = (total.clone(), totals.clone());
    let _effect = effect(move || out.borrow_mut().push(t.get()));

    cart.set("quantity", 5).unwrap();
    cart.set("price", 4).unwrap();

    assert_eq!(*totals.borrow(), vec![6.0, 15.0, 20.0]);
}

/// Test maps and sets inside effects.
#[test]
fn collections_drive_effects() {
    let tags = reactive(&Target::empty_set());
    let scores = reactive(&Target::map());
    let summary = Rc::new(RefCell::new(String::new()));

    let (t, m, out) = (tags.clone(), scores.clone(), summary.clone());
    let _effect = effect(move || {
        *out.borrow_mut() = format!("{} tags, {} scores", t.size(), m.size());
    });
    assert_eq!(*summary.borrow(), "0 tags, 0 scores");

    tags.add("rust").unwrap();
    scores.insert("alice", 3).unwrap();
    assert_eq!(*summary.borrow(), "1 tags, 1 scores");

    tags.add("rust").unwrap();
    scores.insert("alice", 4).unwrap();
    assert_eq!(*summary.borrow(), "1 tags, 1 scores");
}

/// Test wrapping identity properties.
#[test]
fn wrapping_is_idempotent() {
    let raw = Value::from(serde_json::json!({ "nested": { "deep": [1, 2] } }));
    let observed = observe_value(&raw, Mode::Mutable);

    assert!(!is_observed(&raw));
    assert!(is_observed(&observed));
    assert_eq!(observe_value(&observed, Mode::Mutable), observed);
    assert_eq!(to_raw(&observed), raw);

    // Nested reads return the cached wrapper every time
    let state = observed.as_observed().unwrap();
    assert_eq!(state.get("nested"), state.get("nested"));
}

/// Test that writes through a wrapper reach the raw target and raw writes
/// are visible through the wrapper.
#[test]
fn wrapper_and_raw_share_data() {
    let target = Target::record_from([("a", 1)]);
    let state = reactive(&target);

    state.set("a", 2).unwrap();
    assert_eq!(target.get("a"), Value::from(2));

    target.set("a", 3).unwrap();
    assert_eq!(state.get("a"), Value::from(3));

    let view = readonly(&target);
    assert_eq!(view.get("a"), Value::from(3));
    assert!(view.set("a", 4).is_err());
}

/// Test that each thread is an independent reactive context.
#[test]
fn threads_do_not_share_state() {
    let state = reactive(&Target::record_from([("n", 0)]));
    let run_count = Arc::new(AtomicUsize::new(0));

    let (s, runs) = (state.clone(), run_count.clone());
    let _effect = effect(move || {
        s.get("n");
        runs.fetch_add(1, Ordering::SeqCst);
    });

    let other_runs = Arc::new(AtomicUsize::new(0));
    let other_clone = other_runs.clone();
    std::thread::spawn(move || {
        let state = reactive(&Target::record_from([("n", 0)]));
        let s = state.clone();
        let _effect = effect(move || {
            s.get("n");
            other_clone.fetch_add(1, Ordering::SeqCst);
        });
        state.set("n", 1).unwrap();
        assert!(!ReactiveContext::is_active());
    })
    .join()
    .unwrap();

    assert_eq!(other_runs.load(Ordering::SeqCst), 2);
    assert_eq!(run_count.load(Ordering::SeqCst), 1);
}
