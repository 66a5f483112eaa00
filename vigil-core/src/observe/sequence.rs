//! Sequence storage and its overridable methods.
//!
//! A sequence target stores its elements in a type implementing
//! [`Sequence`]. The trait provides the usual array methods on top of two
//! required accessors. A derived sequence type overrides any of them, and an
//! observed wrapper always dispatches to the concrete type's version.
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Stack {
//!     base: Array,
//!     pushes: usize,
//! }
//!
//! impl Sequence for Stack {
//!     fn items(&self) -> &[Value] { self.base.items() }
//!     fn items_mut(&mut self) -> &mut Vec<Value> { self.base.items_mut() }
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//!
//!     fn push(&mut self, values: Vec<Value>) -> usize {
//!         self.pushes += 1;
//!         self.base.push(values)
//!     }
//! }
//! ```

use std::any::Any;

use super::value::Value;

/// Element storage of a sequence target.
pub trait Sequence: Any {
    /// The elements.
    fn items(&self) -> &[Value];

    /// The elements, mutably.
    fn items_mut(&mut self) -> &mut Vec<Value>;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Number of elements.
    fn len(&self) -> usize {
        self.items().len()
    }

    /// Whether there are no elements.
    fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Append `values`, returning the new length.
    fn push(&mut self, values: Vec<Value>) -> usize {
        let items = self.items_mut();
        items.extend(values);
        items.len()
    }

    /// Remove and return the last element.
    fn pop(&mut self) -> Option<Value> {
        self.items_mut().pop()
    }

    /// Remove and return the first element.
    fn shift(&mut self) -> Option<Value> {
        let items = self.items_mut();
        if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        }
    }

    /// Prepend `values`, returning the new length.
    fn unshift(&mut self, values: Vec<Value>) -> usize {
        let items = self.items_mut();
        items.splice(0..0, values);
        items.len()
    }

    /// Remove `delete_count` elements at `start` and insert `values` there.
    ///
    /// Both bounds are clamped to the sequence. Returns the removed elements.
    fn splice(&mut self, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        let items = self.items_mut();
        let start = start.min(items.len());
        let end = start + delete_count.min(items.len() - start);
        items.splice(start..end, values).collect()
    }

    /// Reverse the elements in place.
    fn reverse(&mut self) {
        self.items_mut().reverse();
    }

    /// Copy `start..end` over the elements starting at `target`, without
    /// changing the length.
    fn copy_within(&mut self, target: usize, start: usize, end: Option<usize>) {
        let items = self.items_mut();
        let len = items.len();
        let end = end.unwrap_or(len).min(len);
        let start = start.min(end);
        let target = target.min(len);
        let count = (end - start).min(len - target);
        let copied: Vec<Value> = items[start..start + count].to_vec();
        items[target..target + count].clone_from_slice(&copied);
    }

    /// First index at or after `from` holding a value `===` to `value`.
    fn index_of(&self, value: &Value, from: usize) -> Option<usize> {
        self.items()
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, item)| item.strict_equals(value))
            .map(|(index, _)| index)
    }

    /// Last index at or before `from` (default: the end) holding a value
    /// `===` to `value`.
    fn last_index_of(&self, value: &Value, from: Option<usize>) -> Option<usize> {
        let items = self.items();
        let end = match from {
            Some(from) => (from + 1).min(items.len()),
            None => items.len(),
        };
        items[..end].iter().rposition(|item| item.strict_equals(value))
    }

    /// Whether any element at or after `from` is SameValueZero to `value`.
    fn includes(&self, value: &Value, from: usize) -> bool {
        self.items()
            .iter()
            .skip(from)
            .any(|item| item.same_value_zero(value))
    }
}

/// The plain sequence type.
#[derive(Debug, Clone, Default)]
pub struct Array {
    items: Vec<Value>,
}

impl Array {
    /// An empty array.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl Sequence for Array {
    fn items(&self) -> &[Value] {
        &self.items
    }

    fn items_mut(&mut self) -> &mut Vec<Value> {
        &mut self.items
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
