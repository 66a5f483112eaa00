//! Record and sequence accessors of [`Observed`].
//!
//! Every accessor here turns a property or element access into dependency
//! store operations:
//!
//! - `get` tracks the key and hands nested containers out wrapped
//! - `set` triggers only when the stored value actually changed
//! - `has` and `keys` track existence and enumeration separately from values
//! - `delete` triggers the key and enumeration, never a sequence's length
//!
//! Sequence mutators run the concrete [`Sequence`] method with tracking
//! paused, then compare the elements before and after and publish the net
//! change as one trigger pass.

use smallvec::SmallVec;

use super::sequence::Sequence;
use super::target::{Target, TargetKind, WriteOutcome};
use super::value::{PropKey, Value};
use super::wrapper::Observed;
use crate::diagnostics;
use crate::error::{ReactiveError, ReactiveResult};
use crate::reactive::{pause_tracking, Runtime, TrackKey, TrackOp, Trigger};

impl Observed {
    /// Track a read unless this wrapper is readonly.
    pub(crate) fn track(&self, op: TrackOp, key: TrackKey) {
        if !self.is_readonly() {
            Runtime::track(self.id(), op, key);
        }
    }

    fn unsupported(&self, op: &'static str) -> ReactiveError {
        diagnostics::report(ReactiveError::unsupported(op, self.kind()))
    }

    /// Read a property or element.
    ///
    /// Nested containers come back wrapped in this wrapper's mode (unless it
    /// is shallow). A record property holding a ref reads through the ref;
    /// a sequence element holding one returns the ref itself.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        let kind = self.kind();
        if kind.is_collection() {
            self.unsupported("get");
            return Value::Undefined;
        }

        let value = self.raw().data().read(&key).unwrap_or_default();
        self.track(TrackOp::Get, TrackKey::Prop(key.clone()));

        if self.is_shallow() {
            return value;
        }
        match value {
            Value::Ref(cell) if kind == TargetKind::Sequence && key.as_index().is_some() => {
                Value::Ref(cell)
            }
            Value::Ref(cell) => self.wrap_nested(cell.get()),
            other => self.wrap_nested(other),
        }
    }

    /// Write a property or element.
    ///
    /// Writing a non-ref to a record property that holds a ref writes
    /// through to the ref. Setting `"length"` on a sequence truncates or
    /// extends it.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> ReactiveResult<()> {
        let key = key.into();
        if self.is_readonly() {
            return Err(diagnostics::report(ReactiveError::readonly_set(key.as_str())));
        }
        let kind = self.kind();
        if kind.is_collection() {
            return Err(self.unsupported("set"));
        }

        let value = self.store_value(value.into());
        if kind == TargetKind::Record && !self.is_shallow() && !value.is_ref() {
            let existing = self.raw().data().read(&key);
            if let Some(Value::Ref(cell)) = existing {
                cell.set(value);
                return Ok(());
            }
        }

        let written = {
            let mut data = self.raw().data_mut();
            let old_len = data.len();
            let outcome = data.write(&key, value);
            outcome.map(|outcome| (outcome, old_len, data.len()))
        };
        let (outcome, old_len, len) = written.map_err(diagnostics::report)?;

        let mut triggers: SmallVec<[Trigger; 2]> = SmallVec::new();
        match outcome {
            WriteOutcome::Unchanged => return Ok(()),
            WriteOutcome::Changed if kind == TargetKind::Sequence && key.is_length() => {
                triggers.push(Trigger::length(len));
                if len > old_len {
                    triggers.push(Trigger::fill(old_len..len));
                }
            }
            WriteOutcome::Changed => triggers.push(Trigger::set(TrackKey::Prop(key))),
            WriteOutcome::Added => {
                let hole_end = len.saturating_sub(1);
                triggers.push(Trigger::add(TrackKey::Prop(key)));
                if kind == TargetKind::Sequence && hole_end > old_len {
                    triggers.push(Trigger::fill(old_len..hole_end));
                }
            }
        }
        Runtime::trigger_all(self.id(), kind, &triggers);
        Ok(())
    }

    /// Whether the property or element exists.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if self.kind().is_collection() {
            self.unsupported("has");
            return false;
        }

        let found = self.raw().data().contains_key(&key);
        self.track(TrackOp::Has, TrackKey::Has(key));
        found
    }

    /// Delete a property, or clear a sequence slot to `Undefined`.
    ///
    /// Returns whether the key existed. Only an existing key triggers.
    pub fn delete(&self, key: impl Into<PropKey>) -> ReactiveResult<bool> {
        let key = key.into();
        if self.is_readonly() {
            return Err(diagnostics::report(ReactiveError::readonly_delete(key.as_str())));
        }
        let kind = self.kind();
        if kind.is_collection() {
            return Err(self.unsupported("delete"));
        }

        let removed = self.raw().data_mut().remove(&key);
        if removed {
            Runtime::trigger(self.id(), kind, Trigger::delete(TrackKey::Prop(key)));
        }
        Ok(removed)
    }

    /// Enumerate property keys (sequence indices first).
    ///
    /// On a sequence this depends on the length, so appending elements
    /// re-runs the reader.
    pub fn keys(&self) -> Vec<PropKey> {
        match self.kind() {
            TargetKind::Record => self.track(TrackOp::Iterate, TrackKey::Iterate),
            TargetKind::Sequence => self.track(TrackOp::Iterate, TrackKey::length()),
            TargetKind::Map | TargetKind::Set => {
                self.unsupported("keys");
                return Vec::new();
            }
        }
        self.raw().keys()
    }

    /// Number of properties, elements or entries.
    pub fn len(&self) -> usize {
        match self.kind() {
            TargetKind::Record => self.track(TrackOp::Iterate, TrackKey::Iterate),
            TargetKind::Sequence => self.track(TrackOp::Get, TrackKey::length()),
            TargetKind::Map | TargetKind::Set => self.track(TrackOp::Iterate, TrackKey::Size),
        }
        self.raw().len()
    }

    /// Whether [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set a sequence's length.
    pub fn set_len(&self, len: usize) -> ReactiveResult<()> {
        if self.kind() != TargetKind::Sequence {
            return Err(self.unsupported("set_len"));
        }
        self.set(PropKey::length(), len)
    }

    // ------------------------------------------------------------------------
    // Sequence mutators
    // ------------------------------------------------------------------------

    /// Run `f` on the concrete sequence and trigger the net change.
    fn mutate<R>(
        &self,
        op: &'static str,
        readonly_key: &str,
        f: impl FnOnce(&mut dyn Sequence) -> R,
    ) -> ReactiveResult<R> {
        if self.kind() != TargetKind::Sequence {
            return Err(self.unsupported(op));
        }
        if self.is_readonly() {
            return Err(diagnostics::report(ReactiveError::readonly_set(readonly_key)));
        }

        let before = self.raw().to_vec();
        let result = {
            let _paused = pause_tracking();
            let mut data = self.raw().data_mut();
            let result = data.sequence_mut().map(f);
            result
        };
        let Some(result) = result else {
            return Err(self.unsupported(op));
        };

        let triggers = diff_items(&before, &self.raw().to_vec());
        if !triggers.is_empty() {
            tracing::trace!(target = %self.id(), op, changes = triggers.len(), "sequence mutated");
            Runtime::trigger_all(self.id(), TargetKind::Sequence, &triggers);
        }
        Ok(result)
    }

    /// Append values, returning the new length.
    pub fn push<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> ReactiveResult<usize> {
        let values = self.stored(values);
        self.mutate("push", "length", move |seq| seq.push(values))
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> ReactiveResult<Option<Value>> {
        let popped = self.mutate("pop", "length", |seq| seq.pop())?;
        Ok(popped.map(|value| self.wrap_nested(value)))
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> ReactiveResult<Option<Value>> {
        let shifted = self.mutate("shift", "length", |seq| seq.shift())?;
        Ok(shifted.map(|value| self.wrap_nested(value)))
    }

    /// Prepend values, returning the new length.
    pub fn unshift<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> ReactiveResult<usize> {
        let values = self.stored(values);
        self.mutate("unshift", "length", move |seq| seq.unshift(values))
    }

    /// Remove `delete_count` elements at `start`, insert `values` there, and
    /// return the removed elements.
    pub fn splice<V: Into<Value>>(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = V>,
    ) -> ReactiveResult<Vec<Value>> {
        let values = self.stored(values);
        let removed = self.mutate("splice", "length", move |seq| {
            seq.splice(start, delete_count, values)
        })?;
        Ok(removed.into_iter().map(|value| self.wrap_nested(value)).collect())
    }

    /// Reverse the elements in place.
    pub fn reverse(&self) -> ReactiveResult<()> {
        self.mutate("reverse", "0", |seq| seq.reverse())
    }

    /// Copy `start..end` over the elements at `target`.
    pub fn copy_within(
        &self,
        target: usize,
        start: usize,
        end: Option<usize>,
    ) -> ReactiveResult<()> {
        let key = target.to_string();
        self.mutate("copy_within", &key, |seq| seq.copy_within(target, start, end))
    }

    fn stored<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Vec<Value> {
        values
            .into_iter()
            .map(|value| self.store_value(value.into()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Identity-sensitive searches
    // ------------------------------------------------------------------------

    /// First index at or after `from` holding `value`.
    ///
    /// Finds the element whether `value` and the stored element are wrapped
    /// or raw.
    pub fn index_of(&self, value: &Value, from: usize) -> Option<usize> {
        self.search("index_of", value, Option::is_some, |seq, v| seq.index_of(v, from))
            .flatten()
    }

    /// Last index at or before `from` (default: the end) holding `value`.
    pub fn last_index_of(&self, value: &Value, from: Option<usize>) -> Option<usize> {
        self.search("last_index_of", value, Option::is_some, |seq, v| {
            seq.last_index_of(v, from)
        })
        .flatten()
    }

    /// Whether any element at or after `from` is `value`.
    pub fn includes(&self, value: &Value, from: usize) -> bool {
        self.search("includes", value, |found: &bool| *found, |seq, v| {
            seq.includes(v, from)
        })
        .unwrap_or(false)
    }

    /// Run a search method of the concrete sequence twice at most: over the
    /// elements as this wrapper hands them out with `value` as given, then
    /// over the raw elements with the raw `value`.
    fn search<R>(
        &self,
        op: &'static str,
        value: &Value,
        hit: impl Fn(&R) -> bool,
        f: impl Fn(&dyn Sequence, &Value) -> R,
    ) -> Option<R> {
        if self.kind() != TargetKind::Sequence {
            self.unsupported(op);
            return None;
        }

        let items = self.raw().to_vec();
        self.track(TrackOp::Get, TrackKey::length());
        for index in 0..items.len() {
            self.track(TrackOp::Get, TrackKey::index(index));
        }

        let _paused = pause_tracking();
        let viewed = items.iter().map(|item| self.wrap_nested(item.clone())).collect();
        let first = with_items_swapped(self.raw(), viewed, |seq| f(seq, value))?;
        if hit(&first) {
            return Some(first);
        }

        let raw = items.iter().map(Value::to_raw).collect();
        with_items_swapped(self.raw(), raw, |seq| f(seq, &value.to_raw()))
    }

    // ------------------------------------------------------------------------
    // Copying reads
    // ------------------------------------------------------------------------

    /// All elements as this wrapper hands them out.
    pub fn to_vec(&self) -> Vec<Value> {
        if self.kind() != TargetKind::Sequence {
            self.unsupported("to_vec");
            return Vec::new();
        }

        let items = self.raw().to_vec();
        self.track(TrackOp::Get, TrackKey::length());
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                self.track(TrackOp::Get, TrackKey::index(index));
                self.wrap_nested(item)
            })
            .collect()
    }

    /// A new raw sequence holding `start..end` of this one's elements.
    pub fn slice(&self, start: usize, end: Option<usize>) -> Target {
        let items = self.to_vec();
        let end = end.unwrap_or(items.len()).min(items.len());
        let start = start.min(end);
        Target::array(items[start..end].iter().cloned())
    }

    /// A new raw sequence holding this one's elements followed by `others`.
    ///
    /// Sequence arguments are spread; anything else is appended as is. Refs
    /// are carried over as refs.
    pub fn concat(&self, others: &[Value]) -> Target {
        let mut items = self.to_vec();
        for other in others {
            match other {
                Value::Observed(observed) if observed.kind() == TargetKind::Sequence => {
                    items.extend(observed.to_vec());
                }
                Value::Object(target) if target.kind() == TargetKind::Sequence => {
                    items.extend(target.to_vec());
                }
                other => items.push(other.clone()),
            }
        }
        Target::array(items)
    }

    /// Borrow the concrete sequence type, untracked.
    pub fn with_sequence<S: Sequence, R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.raw().with_sequence(f)
    }
}

/// Triggers describing how a sequence's elements changed.
fn diff_items(before: &[Value], after: &[Value]) -> Vec<Trigger> {
    let common = before.len().min(after.len());
    let mut triggers: Vec<Trigger> = (0..common)
        .filter(|&index| before[index] != after[index])
        .map(|index| Trigger::set(TrackKey::index(index)))
        .collect();
    triggers.extend((common..after.len()).map(|index| Trigger::add(TrackKey::index(index))));
    if after.len() < before.len() {
        triggers.push(Trigger::length(after.len()));
    }
    triggers
}

/// Restores a sequence's own elements after a search ran over a substitute.
struct SwappedItems<'a> {
    target: &'a Target,
    original: Vec<Value>,
}

impl Drop for SwappedItems<'_> {
    fn drop(&mut self) {
        if let Some(seq) = self.target.data_mut().sequence_mut() {
            *seq.items_mut() = std::mem::take(&mut self.original);
        }
    }
}

fn with_items_swapped<R>(
    target: &Target,
    items: Vec<Value>,
    f: impl FnOnce(&dyn Sequence) -> R,
) -> Option<R> {
    let original = {
        let mut data = target.data_mut();
        let seq = data.sequence_mut()?;
        std::mem::replace(seq.items_mut(), items)
    };
    let _restore = SwappedItems { target, original };

    let data = target.data();
    let result = data.sequence().map(f);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{reactive, readonly, shallow_reactive};
    use crate::reactive::{effect, Ref};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn runs() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn record_reads_are_tracked() {
        let state = reactive(&Target::record_from([("count", 1)]));
        let seen = Rc::new(Cell::new(0.0));

        let (s, out) = (state.clone(), seen.clone());
        let _effect = effect(move || out.set(s.get("count").as_number().unwrap_or(-1.0)));
        assert_eq!(seen.get(), 1.0);

        state.set("count", 2).unwrap();
        assert_eq!(seen.get(), 2.0);
        assert_eq!(state.raw().get("count"), Value::from(2));
    }

    #[test]
    fn unchanged_writes_do_not_trigger() {
        let state = reactive(&Target::record_from([("n", f64::NAN)]));
        let (count, c) = runs();

        let s = state.clone();
        let _effect = effect(move || {
            s.get("n");
            c.set(c.get() + 1);
        });

        state.set("n", f64::NAN).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn nested_containers_are_wrapped_lazily() {
        let child = Target::record_from([("foo", 1)]);
        let parent = reactive(&Target::record_from([("child", child.clone())]));

        let nested = parent.get("child");
        assert_eq!(nested, Value::from(reactive(&child)));
        assert_eq!(to_raw_target(&nested), child);

        let shallow = shallow_reactive(parent.raw());
        assert_eq!(shallow.get("child"), Value::from(child));
    }

    fn to_raw_target(value: &Value) -> Target {
        value.as_target().cloned().unwrap()
    }

    #[test]
    fn adding_a_key_triggers_enumeration() {
        let state = reactive(&Target::record());
        let keys = Rc::new(RefCell::new(Vec::new()));

        let (s, out) = (state.clone(), keys.clone());
        let _effect = effect(move || *out.borrow_mut() = s.keys());
        assert!(keys.borrow().is_empty());

        state.set("a", 1).unwrap();
        assert_eq!(*keys.borrow(), vec![PropKey::from("a")]);

        state.delete("a").unwrap();
        assert!(keys.borrow().is_empty());
    }

    #[test]
    fn has_tracks_existence_only() {
        let state = reactive(&Target::record_from([("a", 1)]));
        let (count, c) = runs();

        let s = state.clone();
        let _effect = effect(move || {
            s.has("b");
            c.set(c.get() + 1);
        });

        state.set("a", 2).unwrap();
        assert_eq!(count.get(), 1);

        state.set("b", 1).unwrap();
        assert_eq!(count.get(), 2);

        state.set("b", 2).unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn record_refs_are_unwrapped_and_written_through() {
        let cell = Ref::new(Value::from(1));
        let state = reactive(&Target::record_from([("r", cell.clone())]));

        assert_eq!(state.get("r"), Value::from(1));
        state.set("r", 5).unwrap();
        assert_eq!(cell.get_untracked(), Value::from(5));
        assert!(state.raw().get("r").is_ref());

        // Assigning another ref replaces it.
        let other = Ref::new(Value::from(9));
        state.set("r", other.clone()).unwrap();
        assert_eq!(state.raw().get("r"), Value::from(other));
    }

    #[test]
    fn readonly_rejects_and_does_not_track() {
        let target = Target::record_from([("a", 1)]);
        let ro = readonly(&target);

        assert_eq!(ro.set("a", 2), Err(ReactiveError::readonly_set("a")));
        assert_eq!(ro.delete("a"), Err(ReactiveError::readonly_delete("a")));
        assert_eq!(target.get("a"), Value::from(1));

        let r = ro.clone();
        let watcher = effect(move || {
            r.get("a");
        });
        assert_eq!(watcher.dependency_count(), 0);
    }

    #[test]
    fn length_truncation_triggers_trailing_indices() {
        let list = reactive(&Target::array([1, 2, 3]));
        let (count, c) = runs();

        let l = list.clone();
        let _effect = effect(move || {
            l.get(2usize);
            c.set(c.get() + 1);
        });

        list.set_len(3).unwrap();
        assert_eq!(count.get(), 1);

        list.set_len(2).unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(list.get(2usize), Value::Undefined);
    }

    #[test]
    fn writing_past_the_end_triggers_existence_of_holes() {
        let list = reactive(&Target::array([1]));
        let seen = Rc::new(Cell::new(false));
        let (count, c) = runs();

        let (l, out) = (list.clone(), seen.clone());
        let _effect = effect(move || {
            out.set(l.has(2usize));
            c.set(c.get() + 1);
        });
        assert!(!seen.get());

        list.set(3usize, 4).unwrap();
        assert_eq!(count.get(), 2);
        assert!(seen.get());
        assert_eq!(list.get(2usize), Value::Undefined);
    }

    #[test]
    fn growing_length_triggers_existence_of_new_slots() {
        let list = reactive(&Target::array([1]));
        let (count, c) = runs();

        let l = list.clone();
        let _effect = effect(move || {
            l.has(1usize);
            l.get(1usize);
            c.set(c.get() + 1);
        });

        list.set_len(3).unwrap();
        assert_eq!(count.get(), 2);
        assert!(list.has(1usize));
    }

    #[test]
    fn oversized_sequence_writes_are_rejected() {
        let list = reactive(&Target::array([1, 2]));
        let (count, c) = runs();

        let l = list.clone();
        let _effect = effect(move || {
            l.len();
            c.set(c.get() + 1);
        });

        assert_eq!(
            list.set_len(4_000_000_000),
            Err(ReactiveError::InvalidLength("4000000000".into()))
        );
        assert_eq!(
            list.set(4_294_967_294usize, 1),
            Err(ReactiveError::InvalidLength("4294967295".into()))
        );
        assert_eq!(list.len(), 2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn mutators_trigger_once_per_call() {
        let list = reactive(&Target::array([1, 2]));
        let (count, c) = runs();

        let l = list.clone();
        let _effect = effect(move || {
            l.len();
            l.get(0usize);
            l.get(1usize);
            c.set(c.get() + 1);
        });

        assert_eq!(list.push([3, 4, 5]).unwrap(), 5);
        assert_eq!(count.get(), 2);

        let removed = list.splice(0, 2, [Value::from(9)]).unwrap();
        assert_eq!(removed, vec![Value::from(1), Value::from(2)]);
        assert_eq!(count.get(), 3);
        assert_eq!(list.raw().len(), 4);
    }

    #[test]
    fn mutators_track_nothing_themselves() {
        let list = reactive(&Target::array([1]));
        let l = list.clone();
        let watcher = effect(move || {
            l.push([2]).unwrap();
        });
        assert_eq!(watcher.dependency_count(), 0);
        assert_eq!(list.raw().len(), 2);
    }

    #[test]
    fn sequence_methods_reject_records() {
        let state = reactive(&Target::record());
        assert_eq!(
            state.push([1]),
            Err(ReactiveError::unsupported("push", TargetKind::Record))
        );
        assert_eq!(state.index_of(&Value::from(1), 0), None);
    }

    #[test]
    fn diff_reports_net_changes() {
        let before = [Value::from(1), Value::from(2), Value::from(3)];

        let after = [Value::from(1), Value::from(9)];
        assert_eq!(
            diff_items(&before, &after),
            vec![Trigger::set(TrackKey::index(1)), Trigger::length(2)]
        );

        let after = [Value::from(1), Value::from(2), Value::from(3), Value::from(4)];
        assert_eq!(diff_items(&before, &after), vec![Trigger::add(TrackKey::index(3))]);
    }

    #[test]
    fn searches_restore_the_elements() {
        let child = Target::record();
        let list = reactive(&Target::array([Value::from(child.clone())]));

        assert_eq!(list.index_of(&Value::from(child.clone()), 0), Some(0));
        assert_eq!(list.raw().get(0usize), Value::from(child));
    }
}
