//! Ref Implementation
//!
//! A Ref is a single reactive cell. It exposes the same track/trigger
//! contract as one property of an observed record: reading it inside an
//! effect records a dependency, and writing a different value notifies
//! every dependent.
//!
//! # Equality
//!
//! `set` only notifies when the new value differs from the stored one
//! according to `PartialEq`. For [`Value`](crate::observe::Value) this is
//! SameValue, so containers compare by identity and `NaN` equals itself.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::dep::Dep;
use super::runtime::{Runtime, TrackOp, TriggerOp};
use crate::error::ReactiveError;

/// The contract shared by [`Ref`] and [`Computed`](super::Computed).
pub trait RefLike<T> {
    /// Read the value, tracking it in the running effect.
    ///
    /// # Panics
    ///
    /// A [`Computed`](super::Computed) whose getter reads itself before it
    /// has a first value panics here. [`Computed::try_get`](super::Computed::try_get)
    /// reports the same case and returns `None`.
    fn get(&self) -> T;

    /// Write the value.
    fn try_set(&self, value: T) -> Result<(), ReactiveError>;
}

struct RefInner<T> {
    value: RefCell<T>,
    dep: Rc<Dep>,
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Ref<T: 'static> {
    inner: Rc<RefInner<T>>,
}

impl<T: 'static> Ref<T> {
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                value: RefCell::new(value),
                dep: Dep::cell(),
            }),
        }
    }

    /// Borrow the value, tracking it in the running effect.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track_dep(&self.inner.dep, TrackOp::Get);
        let value = self.inner.value.borrow();
        f(&*value)
    }

    /// Notify every dependent without changing the value.
    pub fn trigger(&self) {
        Runtime::trigger_dep(&self.inner.dep, TriggerOp::Set);
    }

    /// Get the number of effects depending on this ref.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }

    /// Whether both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Ref<T> {
    /// Get the current value.
    ///
    /// Inside a running effect, this also records the dependency.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without tracking it.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: PartialEq + 'static> Ref<T> {
    /// Set a new value, notifying dependents if it changed.
    pub fn set(&self, value: T) {
        let changed = *self.inner.value.borrow() != value;
        if !changed {
            return;
        }

        *self.inner.value.borrow_mut() = value;
        Runtime::trigger_dep(&self.inner.dep, TriggerOp::Set);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let current = self.inner.value.borrow();
            f(&*current)
        };
        self.set(new_value);
    }
}

impl<T: Clone + PartialEq + 'static> RefLike<T> for Ref<T> {
    fn get(&self) -> T {
        Ref::get(self)
    }

    fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        self.set(value);
        Ok(())
    }
}

impl<T: 'static> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

// Refs compare and hash by identity, like any other reactive container.
impl<T: 'static> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: 'static> Eq for Ref<T> {}

impl<T: 'static> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl<T: Debug + 'static> Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_borrow() {
            Ok(value) => f
                .debug_struct("Ref")
                .field("value", &*value)
                .field("subscriber_count", &self.subscriber_count())
                .finish(),
            Err(_) => f.write_str("Ref(<borrowed>)"),
        }
    }
}

/// Create a new ref.
pub fn reference<T: 'static>(value: T) -> Ref<T> {
    Ref::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
