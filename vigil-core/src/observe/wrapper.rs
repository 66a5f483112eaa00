//! Observed wrappers and the wrapper cache.
//!
//! An [`Observed`] is the façade that routes every access to a target
//! through the dependency store. There is at most one live wrapper per
//! `(target, mode)` pair: wrapping again returns the cached one.
//!
//! The cache holds wrappers weakly. A wrapper keeps its target alive, the
//! cache keeps neither alive, and a wrapper's entry is removed when the last
//! handle to it is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use super::target::{Target, TargetId, TargetKind};
use super::value::Value;
use crate::diagnostics;
use crate::error::ReactiveError;

/// How a wrapper exposes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Tracked reads, triggering writes, nested containers wrapped on read.
    Mutable,
    /// Untracked reads, rejected writes, nested containers wrapped readonly.
    Readonly,
    /// Like `Mutable`, but nested values are returned raw.
    Shallow,
    /// Like `Readonly`, but nested values are returned raw.
    ShallowReadonly,
}

impl Mode {
    /// Whether writes are rejected.
    pub fn is_readonly(self) -> bool {
        matches!(self, Self::Readonly | Self::ShallowReadonly)
    }

    /// Whether nested values are returned raw.
    pub fn is_shallow(self) -> bool {
        matches!(self, Self::Shallow | Self::ShallowReadonly)
    }
}

thread_local! {
    static WRAPPERS: RefCell<HashMap<(TargetId, Mode), Weak<WrapperInner>>> =
        RefCell::new(HashMap::new());
}

struct WrapperInner {
    target: Target,
    mode: Mode,
}

impl Drop for WrapperInner {
    fn drop(&mut self) {
        let key = (self.target.id(), self.mode);
        let _ = WRAPPERS.try_with(|wrappers| {
            let mut wrappers = wrappers.borrow_mut();
            if wrappers.get(&key).is_some_and(|weak| weak.strong_count() == 0) {
                wrappers.remove(&key);
            }
        });
    }
}

/// An observed view of one target.
///
/// Reads through the wrapper are tracked by the running effect (unless the
/// mode is readonly) and writes trigger dependents. The accessors live in the
/// `handlers` (records and sequences) and `collection` (maps and sets)
/// modules.
#[derive(Clone)]
pub struct Observed {
    inner: Rc<WrapperInner>,
}

impl Observed {
    /// The raw target behind this wrapper.
    pub fn raw(&self) -> &Target {
        &self.inner.target
    }

    /// The wrapper's mode.
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// The raw target's identity.
    pub fn id(&self) -> TargetId {
        self.inner.target.id()
    }

    /// The kind of the raw target.
    pub fn kind(&self) -> TargetKind {
        self.inner.target.kind()
    }

    /// Whether writes are rejected.
    pub fn is_readonly(&self) -> bool {
        self.inner.mode.is_readonly()
    }

    /// Whether nested values are returned raw.
    pub fn is_shallow(&self) -> bool {
        self.inner.mode.is_shallow()
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The form a stored value is handed out in.
    ///
    /// Deep wrappers wrap nested containers in their own mode. Refs and
    /// primitives pass through unchanged.
    pub(crate) fn wrap_nested(&self, value: Value) -> Value {
        if self.is_shallow() {
            return value;
        }
        let mode = self.mode();
        match value {
            Value::Object(target) => Value::Observed(observe(&target, mode)),
            Value::Observed(observed) if observed.mode() != mode && !observed.is_readonly() => {
                Value::Observed(observe(observed.raw(), mode))
            }
            other => other,
        }
    }

    /// The form a written value is stored in: raw, unless the wrapper is
    /// shallow.
    pub(crate) fn store_value(&self, value: Value) -> Value {
        match value {
            Value::Observed(observed) if !self.is_shallow() && !observed.is_readonly() => {
                Value::Object(observed.raw().clone())
            }
            other => other,
        }
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.mode() == other.mode()
    }
}

impl Eq for Observed {}

impl Hash for Observed {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
        self.mode().hash(state);
    }
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("target", &self.id())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Wrap `target` in `mode`, reusing the cached wrapper if one is alive.
pub fn observe(target: &Target, mode: Mode) -> Observed {
    let key = (target.id(), mode);
    WRAPPERS.with(|wrappers| {
        let mut wrappers = wrappers.borrow_mut();
        if let Some(inner) = wrappers.get(&key).and_then(Weak::upgrade) {
            return Observed { inner };
        }

        let inner = Rc::new(WrapperInner {
            target: target.clone(),
            mode,
        });
        wrappers.insert(key, Rc::downgrade(&inner));
        tracing::trace!(target = %key.0, ?mode, "wrapper created");
        Observed { inner }
    })
}

/// A deep mutable wrapper.
pub fn reactive(target: &Target) -> Observed {
    observe(target, Mode::Mutable)
}

/// A deep readonly wrapper.
pub fn readonly(target: &Target) -> Observed {
    observe(target, Mode::Readonly)
}

/// A mutable wrapper that returns nested values raw.
pub fn shallow_reactive(target: &Target) -> Observed {
    observe(target, Mode::Shallow)
}

/// A readonly wrapper that returns nested values raw.
pub fn shallow_readonly(target: &Target) -> Observed {
    observe(target, Mode::ShallowReadonly)
}

/// Wrap any value in `mode`.
///
/// Already-observed values in the same mode are returned as they are, and a
/// readonly wrapper asked to become mutable stays readonly. Other wrappers
/// are re-wrapped from their raw target. Values that are not containers are
/// reported and returned unchanged.
pub fn observe_value(value: &Value, mode: Mode) -> Value {
    match value {
        Value::Object(target) => Value::Observed(observe(target, mode)),
        Value::Observed(observed) if observed.mode() == mode => value.clone(),
        Value::Observed(observed) if observed.is_readonly() && !mode.is_readonly() => {
            value.clone()
        }
        Value::Observed(observed) => Value::Observed(observe(observed.raw(), mode)),
        other => {
            diagnostics::report(ReactiveError::NotObservable(other.to_string()));
            other.clone()
        }
    }
}

/// Whether the value is an observed wrapper.
pub fn is_observed(value: &Value) -> bool {
    matches!(value, Value::Observed(_))
}

/// Whether the value is a mutable wrapper.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Observed(observed) if !observed.is_readonly())
}

/// Whether the value is a readonly wrapper.
pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Observed(observed) if observed.is_readonly())
}

/// Whether the value is a shallow wrapper.
pub fn is_shallow(value: &Value) -> bool {
    matches!(value, Value::Observed(observed) if observed.is_shallow())
}

/// The raw form of a value; anything that is not a wrapper passes through.
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}

/// Whether the value is a ref.
pub fn is_ref(value: &Value) -> bool {
    value.is_ref()
}
