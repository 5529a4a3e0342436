//! Dependency Subject
//!
//! A `Dep` is the wiring between one reactive property and the watchers
//! that read it. Every instrumented property owns exactly one `Dep` for the
//! lifetime of its owner; observers hand them out, watchers subscribe to
//! them, and writers call [`Dep::notify`].
//!
//! # Subscription Protocol
//!
//! Subscription is bidirectional: the dep records the watcher (here) and
//! the watcher records the dep (in its dependency sets). The watcher side
//! deduplicates by dep id within an evaluation pass, so a dep never holds
//! the same watcher twice.
//!
//! Subscribers are held weakly. A watcher that was dropped without a
//! `teardown()` call must not stay reachable from the properties it read,
//! so dead entries are pruned whenever the list is touched for
//! notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::watch::context;
use crate::watch::watcher::Watcher;

/// Counter for generating unique dep IDs.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_dep_id() -> u64 {
    DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The subscriber list for one reactive property.
///
/// Cloning a `Dep` clones a handle to the same subscriber list; deps are
/// compared and deduplicated by [`Dep::id`].
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

struct DepInner {
    id: u64,
    /// Subscribed watchers in subscription order.
    subs: RwLock<Vec<Weak<Watcher>>>,
}

impl Dep {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: next_dep_id(),
                subs: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Get the dep's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn add_sub(&self, watcher: &Weak<Watcher>) {
        self.inner.subs.write().push(watcher.clone());
    }

    pub(crate) fn remove_sub(&self, watcher_id: u64) {
        self.inner
            .subs
            .write()
            .retain(|weak| match weak.upgrade() {
                Some(watcher) => watcher.id() != watcher_id,
                None => false,
            });
    }

    /// Register the currently evaluating watcher, if any, as a subscriber.
    ///
    /// Called from property getters. A no-op outside of watcher evaluation.
    pub fn depend(&self) {
        if let Some(target) = context::current_target() {
            target.add_dep(self.clone());
        }
    }

    /// Notify all live subscribers that the property changed.
    ///
    /// Takes a snapshot of the subscriber list first, so a callback that
    /// unsubscribes (or subscribes) during the pass cannot affect which
    /// watchers this pass reaches. Dead weak entries are pruned here.
    pub fn notify(&self) {
        let subscribers: Vec<Arc<Watcher>> = {
            let mut subs = self.inner.subs.write();
            subs.retain(|weak| weak.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };
        for watcher in subscribers {
            watcher.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    use crate::value::Value;
    use crate::watch::watcher::{Watcher, WatcherOptions};

    /// A sync watcher whose getter depends on `dep` and counts evaluations.
    fn counting_watcher(dep: Dep, count: Arc<AtomicI32>) -> Arc<Watcher> {
        Watcher::new(
            None,
            Arc::new(move || {
                dep.depend();
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }),
            None,
            "test",
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn dep_ids_are_unique() {
        let d1 = Dep::new();
        let d2 = Dep::new();
        assert_ne!(d1.id(), d2.id());
    }

    #[test]
    fn notify_reaches_subscribers_in_order() {
        let dep = Dep::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut watchers = Vec::new();
        for tag in [1, 2, 3] {
            let dep_clone = dep.clone();
            let order_clone = order.clone();
            watchers.push(Watcher::new(
                None,
                Arc::new(move || {
                    dep_clone.depend();
                    order_clone.lock().push(tag);
                    Ok(Value::Null)
                }),
                None,
                "test",
                WatcherOptions {
                    sync: true,
                    ..Default::default()
                },
            ));
        }
        order.lock().clear();

        dep.notify();
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn dropped_watcher_is_pruned_on_notify() {
        let dep = Dep::new();
        let count = Arc::new(AtomicI32::new(0));

        let watcher = counting_watcher(dep.clone(), count.clone());
        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(watcher);
        dep.notify();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn depend_outside_evaluation_is_a_no_op() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }
}
