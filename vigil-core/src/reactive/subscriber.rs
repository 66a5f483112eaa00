//! Subscriber types for the reactive system.
//!
//! A subscriber is any tracked computation that depends on reactive values:
//! plain effects, the internal effect of a computed, or a render function
//! driven by an external scheduler.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::runtime::Reactive;

/// Unique identifier for a subscriber.
///
/// Each effect gets a unique ID when created. Deps store these IDs rather
/// than the effects themselves, so an edge never keeps an effect alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pending re-run handed to an effect's scheduler.
///
/// The job holds its effect weakly: a consumer may queue jobs and flush them
/// later, and a job whose effect was stopped or dropped in the meantime is
/// simply skipped.
#[derive(Clone)]
pub struct Job {
    id: SubscriberId,
    reactive: Weak<dyn Reactive>,
}

impl Job {
    pub(crate) fn new(reactive: &Rc<dyn Reactive>) -> Self {
        Self {
            id: reactive.subscriber_id(),
            reactive: Rc::downgrade(reactive),
        }
    }

    /// The subscriber this job would re-run.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether running the job would still do anything.
    pub fn is_live(&self) -> bool {
        self.reactive
            .upgrade()
            .map(|reactive| reactive.is_active())
            .unwrap_or(false)
    }

    /// Re-run the effect now.
    ///
    /// Returns `false` if the effect is gone or stopped.
    pub fn run(&self) -> bool {
        match self.reactive.upgrade() {
            Some(reactive) if reactive.is_active() => {
                reactive.execute();
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}
