//! Diagnostic channel for usage warnings.
//!
//! Rejected operations never panic. They are logged through `tracing` at
//! `warn` level and, if one is installed, handed to the per-thread warn
//! handler so a consumer can surface them however it likes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ReactiveError;

/// Callback invoked for every reported usage warning.
pub type WarnHandler = Rc<dyn Fn(&ReactiveError)>;

thread_local! {
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = RefCell::new(None);
}

/// Install a warn handler for the current thread.
///
/// Returns the previously installed handler, if any.
pub fn set_warn_handler<F>(handler: F) -> Option<WarnHandler>
where
    F: Fn(&ReactiveError) + 'static,
{
    WARN_HANDLER.with(|slot| slot.borrow_mut().replace(Rc::new(handler)))
}

/// Remove the current thread's warn handler.
pub fn take_warn_handler() -> Option<WarnHandler> {
    WARN_HANDLER.with(|slot| slot.borrow_mut().take())
}

/// Publish a usage warning and hand it back so callers can return it.
pub fn report(error: ReactiveError) -> ReactiveError {
    tracing::warn!(%error, "reactive usage warning");

    // Clone out of the slot so the handler may replace itself.
    let handler = WARN_HANDLER
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten();
    if let Some(handler) = handler {
        handler(&error);
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn handler_receives_reports() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        set_warn_handler(move |_| seen_clone.set(seen_clone.get() + 1));

        report(ReactiveError::ReadonlyComputed);
        report(ReactiveError::InvalidLength("-1".into()));
        assert_eq!(seen.get(), 2);

        assert!(take_warn_handler().is_some());
        report(ReactiveError::ReadonlyComputed);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn report_returns_the_error() {
        let err = report(ReactiveError::NoActiveEffect("on_cleanup"));
        assert_eq!(err, ReactiveError::NoActiveEffect("on_cleanup"));
    }
}
