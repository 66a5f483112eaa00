//! Error types for the reactive core.
//!
//! Nothing in this crate is fatal. Every variant here describes a usage
//! mistake that was rejected as a no-op; the same value is also published on
//! the diagnostic channel (see [`crate::diagnostics`]).

use thiserror::Error;

use crate::observe::TargetKind;

/// Errors reported by rejected reactive operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write went through a readonly wrapper.
    #[error("Set operation on key \"{key}\" failed: target is readonly")]
    ReadonlySet {
        /// The key that was written.
        key: String,
    },

    /// A delete went through a readonly wrapper.
    #[error("Delete operation on key \"{key}\" failed: target is readonly")]
    ReadonlyDelete {
        /// The key that was deleted.
        key: String,
    },

    /// A computed without a setter was written to.
    #[error("Write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// The operation does not exist for this kind of target.
    #[error("Operation `{op}` is not supported on a {kind} target")]
    UnsupportedOperation {
        /// Name of the rejected operation.
        op: &'static str,
        /// Kind of target it was attempted on.
        kind: TargetKind,
    },

    /// A sequence length was set to something that is not a valid length.
    #[error("Invalid sequence length: {0}")]
    InvalidLength(String),

    /// A primitive value was passed where a container was required.
    #[error("Value cannot be made reactive: {0}")]
    NotObservable(String),

    /// A computed's getter read the same computed before it had a value.
    #[error("Computed value read itself while computing its first value")]
    CyclicComputed,

    /// A hook that needs a running effect was called outside of one.
    #[error("`{0}` was called when there is no active effect to associate with")]
    NoActiveEffect(&'static str),
}

impl ReactiveError {
    /// Create a ReadonlySet error.
    pub fn readonly_set(key: impl Into<String>) -> Self {
        Self::ReadonlySet { key: key.into() }
    }

    /// Create a ReadonlyDelete error.
    pub fn readonly_delete(key: impl Into<String>) -> Self {
        Self::ReadonlyDelete { key: key.into() }
    }

    /// Create an UnsupportedOperation error.
    pub fn unsupported(op: &'static str, kind: TargetKind) -> Self {
        Self::UnsupportedOperation { op, kind }
    }
}

/// Result alias used by mutating accessors.
pub type ReactiveResult<T> = Result<T, ReactiveError>;
