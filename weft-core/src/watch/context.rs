//! Evaluation Context
//!
//! Tracks which watcher is currently evaluating. When a reactive property
//! is read, its dep asks this module for the active watcher and registers
//! it as a subscriber. That is the whole trick behind automatic dependency
//! discovery: readers never subscribe explicitly.
//!
//! # Implementation
//!
//! A thread-local stack of watcher handles. Nested evaluation (a computed
//! read inside a render evaluation) pushes a second frame; the top frame is
//! the implicit subscriber. A `None` frame disables tracking entirely,
//! which is how error hooks and immediate-watch callbacks run without
//! attributing their reads to whatever watcher happened to be evaluating.
//!
//! The engine assumes one logical thread per reactive graph, so the stack
//! needs no synchronization. Frames are popped by an RAII guard, so the
//! stack survives early returns from failing getters without leaking
//! dependency attribution to the wrong watcher.

use std::cell::RefCell;
use std::sync::Arc;

use super::watcher::Watcher;

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Arc<Watcher>>>> = RefCell::new(Vec::new());
}

/// Guard that pops the target stack when dropped.
pub(crate) struct TargetGuard {
    _private: (),
}

/// Push a target frame. `None` disables dependency tracking until the
/// returned guard drops.
pub(crate) fn push_target(watcher: Option<Arc<Watcher>>) -> TargetGuard {
    TARGET_STACK.with(|stack| stack.borrow_mut().push(watcher));
    TargetGuard { _private: () }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert!(popped.is_some(), "target stack underflow");
        });
    }
}

/// The watcher currently collecting dependencies, if any.
pub(crate) fn current_target() -> Option<Arc<Watcher>> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Whether property reads are currently being tracked.
pub fn is_tracking() -> bool {
    current_target().is_some()
}

/// Run `f` with dependency tracking disabled.
///
/// Reads inside `f` do not subscribe the currently evaluating watcher.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = push_target(None);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::watch::watcher::WatcherOptions;

    fn idle_watcher() -> Arc<Watcher> {
        Watcher::new(
            None,
            Arc::new(|| Ok(Value::Null)),
            None,
            "test",
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn guard_pushes_and_pops() {
        let watcher = idle_watcher();

        assert!(!is_tracking());
        {
            let _guard = push_target(Some(watcher.clone()));
            assert!(is_tracking());
            assert_eq!(current_target().unwrap().id(), watcher.id());
        }
        assert!(!is_tracking());
    }

    #[test]
    fn nested_frames_shadow_outer() {
        let outer = idle_watcher();
        let inner = idle_watcher();

        let _outer_guard = push_target(Some(outer.clone()));
        {
            let _inner_guard = push_target(Some(inner.clone()));
            assert_eq!(current_target().unwrap().id(), inner.id());
        }
        assert_eq!(current_target().unwrap().id(), outer.id());
    }

    #[test]
    fn none_frame_disables_tracking() {
        let watcher = idle_watcher();
        let _guard = push_target(Some(watcher));

        assert!(is_tracking());
        untracked(|| {
            assert!(!is_tracking());
            assert!(current_target().is_none());
        });
        assert!(is_tracking());
    }
}
