//! Map and set accessors of [`Observed`].
//!
//! Collections are keyed by [`Value`]. Entry reads track the entry's key,
//! enumeration tracks a shared iteration marker, and `size` tracks its own
//! marker. Adding or removing an entry triggers all three; overwriting a map
//! value triggers the key and value enumeration but not key enumeration.
//!
//! Keys are looked up as given first and then in their raw form, so a
//! wrapped and an unwrapped handle to the same container find the same
//! entry.

use super::target::{TargetData, TargetKind};
use super::value::Value;
use super::wrapper::Observed;
use crate::diagnostics;
use crate::error::{ReactiveError, ReactiveResult};
use crate::reactive::{Runtime, TrackKey, TrackOp, Trigger};

impl Observed {
    fn require_collection(
        &self,
        op: &'static str,
        allowed: &[TargetKind],
    ) -> ReactiveResult<TargetKind> {
        let kind = self.kind();
        if allowed.contains(&kind) {
            Ok(kind)
        } else {
            Err(diagnostics::report(ReactiveError::unsupported(op, kind)))
        }
    }

    /// The stored key matching `key`: as given if present, else its raw form.
    fn stored_key(&self, key: &Value) -> Value {
        let given = key.clone().normalized_key();
        let raw = key.to_raw().normalized_key();
        if given == raw {
            return given;
        }
        let present = match &*self.raw().data() {
            TargetData::Map(entries) => entries.contains_key(&given),
            TargetData::Set(values) => values.contains(&given),
            _ => false,
        };
        if present {
            given
        } else {
            raw
        }
    }

    /// Track `key` and, if it differs, its raw form.
    fn track_entry(&self, op: TrackOp, key: &Value) {
        let given = key.clone().normalized_key();
        let raw = key.to_raw().normalized_key();
        if given != raw {
            self.track(op, TrackKey::Entry(given));
        }
        self.track(op, TrackKey::Entry(raw));
    }

    /// Read a map entry. `Undefined` if absent.
    pub fn entry(&self, key: &Value) -> Value {
        if self.require_collection("entry", &[TargetKind::Map]).is_err() {
            return Value::Undefined;
        }

        self.track_entry(TrackOp::Get, key);
        let stored = self.stored_key(key);
        let value = match &*self.raw().data() {
            TargetData::Map(entries) => entries.get(&stored).cloned(),
            _ => None,
        };
        value.map_or(Value::Undefined, |value| self.wrap_nested(value))
    }

    /// Write a map entry.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> ReactiveResult<()> {
        let key = key.into();
        if self.is_readonly() {
            return Err(diagnostics::report(ReactiveError::readonly_set(key.to_string())));
        }
        self.require_collection("insert", &[TargetKind::Map])?;

        let value = self.store_value(value.into());
        let stored = self.stored_key(&key);
        let outcome = match &mut *self.raw().data_mut() {
            TargetData::Map(entries) => match entries.get_mut(&stored) {
                Some(slot) if *slot == value => None,
                Some(slot) => {
                    *slot = value;
                    Some(Trigger::set(TrackKey::Entry(stored)))
                }
                None => {
                    entries.insert(stored.clone(), value);
                    Some(Trigger::add(TrackKey::Entry(stored)))
                }
            },
            _ => None,
        };

        if let Some(trigger) = outcome {
            Runtime::trigger(self.id(), TargetKind::Map, trigger);
        }
        Ok(())
    }

    /// Add a set member. Returns whether it was new.
    pub fn add(&self, value: impl Into<Value>) -> ReactiveResult<bool> {
        let value = value.into();
        if self.is_readonly() {
            return Err(diagnostics::report(ReactiveError::readonly_set(value.to_string())));
        }
        self.require_collection("add", &[TargetKind::Set])?;

        let value = self.store_value(value).normalized_key();
        let added = match &mut *self.raw().data_mut() {
            TargetData::Set(values) => values.insert(value.clone()),
            _ => false,
        };
        if added {
            Runtime::trigger(self.id(), TargetKind::Set, Trigger::add(TrackKey::Entry(value)));
        }
        Ok(added)
    }

    /// Whether the map has the key, or the set has the member.
    ///
    /// On a record or sequence this checks the property named by `key`.
    pub fn contains(&self, key: &Value) -> bool {
        match self.kind() {
            TargetKind::Record | TargetKind::Sequence => self.has(key.to_prop_key()),
            TargetKind::Map | TargetKind::Set => {
                self.track_entry(TrackOp::Has, key);
                let stored = self.stored_key(key);
                match &*self.raw().data() {
                    TargetData::Map(entries) => entries.contains_key(&stored),
                    TargetData::Set(values) => values.contains(&stored),
                    _ => false,
                }
            }
        }
    }

    /// Remove a map entry or set member. Returns whether it existed.
    pub fn remove(&self, key: &Value) -> ReactiveResult<bool> {
        if self.is_readonly() {
            return Err(diagnostics::report(ReactiveError::readonly_delete(key.to_string())));
        }
        let kind = self.require_collection("remove", &[TargetKind::Map, TargetKind::Set])?;

        let stored = self.stored_key(key);
        let removed = match &mut *self.raw().data_mut() {
            TargetData::Map(entries) => entries.shift_remove(&stored).is_some(),
            TargetData::Set(values) => values.shift_remove(&stored),
            _ => false,
        };
        if removed {
            Runtime::trigger(self.id(), kind, Trigger::delete(TrackKey::Entry(stored)));
        }
        Ok(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) -> ReactiveResult<()> {
        if self.is_readonly() {
            return Err(diagnostics::report(ReactiveError::readonly_delete("*")));
        }
        let kind = self.require_collection("clear", &[TargetKind::Map, TargetKind::Set])?;

        let removed = match &mut *self.raw().data_mut() {
            TargetData::Map(entries) => std::mem::take(entries).len(),
            TargetData::Set(values) => std::mem::take(values).len(),
            _ => 0,
        };
        if removed > 0 {
            Runtime::trigger(self.id(), kind, Trigger::clear());
        }
        Ok(())
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        if self
            .require_collection("size", &[TargetKind::Map, TargetKind::Set])
            .is_err()
        {
            return 0;
        }
        self.track(TrackOp::Iterate, TrackKey::Size);
        self.raw().len()
    }

    /// Entries in insertion order. A set pairs each member with itself.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        if self
            .require_collection("entries", &[TargetKind::Map, TargetKind::Set])
            .is_err()
        {
            return Vec::new();
        }
        self.track(TrackOp::Iterate, TrackKey::Iterate);
        self.raw()
            .entries()
            .into_iter()
            .map(|(key, value)| (self.wrap_nested(key), self.wrap_nested(value)))
            .collect()
    }

    /// Map values or set members in insertion order.
    pub fn values(&self) -> Vec<Value> {
        if self
            .require_collection("values", &[TargetKind::Map, TargetKind::Set])
            .is_err()
        {
            return Vec::new();
        }
        self.track(TrackOp::Iterate, TrackKey::Iterate);
        self.raw()
            .to_vec()
            .into_iter()
            .map(|value| self.wrap_nested(value))
            .collect()
    }

    /// Map keys or set members in insertion order.
    ///
    /// On a map this depends only on which keys exist, not on their values.
    pub fn map_keys(&self) -> Vec<Value> {
        let Ok(kind) = self.require_collection("map_keys", &[TargetKind::Map, TargetKind::Set])
        else {
            return Vec::new();
        };
        let marker = if kind == TargetKind::Map {
            TrackKey::KeyIterate
        } else {
            TrackKey::Iterate
        };
        self.track(TrackOp::Iterate, marker);
        self.raw()
            .entries()
            .into_iter()
            .map(|(key, _)| self.wrap_nested(key))
            .collect()
    }

    /// Call `f` with every `(value, key)` pair.
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) {
        for (key, value) in self.entries() {
            f(value, key);
        }
    }
}
