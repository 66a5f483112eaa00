//! Dep: the subscriber set of one reactive source.
//!
//! A Dep exists per (target, key) pair in the dependency store, and one per
//! `Ref` and `Computed`. Subscribers are kept in insertion order so that a
//! trigger notifies them in the order they first read the source.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::runtime::TrackKey;
use super::subscriber::SubscriberId;
use crate::observe::TargetId;

/// Where a Dep lives, reported to debug hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepOrigin {
    /// A key of an observed target.
    Target {
        /// The raw target.
        target: TargetId,
        /// The tracked key.
        key: TrackKey,
    },
    /// The single value of a `Ref` or `Computed`.
    Cell,
}

#[derive(Debug)]
pub(crate) struct Dep {
    origin: DepOrigin,
    subscribers: RefCell<IndexSet<SubscriberId>>,
}

impl Dep {
    pub(crate) fn new(origin: DepOrigin) -> Rc<Self> {
        Rc::new(Self {
            origin,
            subscribers: RefCell::new(IndexSet::new()),
        })
    }

    pub(crate) fn cell() -> Rc<Self> {
        Self::new(DepOrigin::Cell)
    }

    pub(crate) fn origin(&self) -> &DepOrigin {
        &self.origin
    }

    /// Add a subscriber. Returns `false` if it was already linked.
    pub(crate) fn subscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.borrow_mut().insert(id)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.borrow_mut().shift_remove(&id);
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.borrow().contains(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Snapshot of the subscribers, in link order.
    pub(crate) fn subscriber_ids(&self) -> SmallVec<[SubscriberId; 4]> {
        self.subscribers.borrow().iter().copied().collect()
    }
}
