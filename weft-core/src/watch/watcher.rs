//! Watcher Implementation
//!
//! A `Watcher` is one unit of reactive computation. Three configurations
//! share the mechanism:
//!
//! - **Render watchers** re-invoke a component's render function; they
//!   have no callback and always run through the scheduler.
//! - **Computed watchers** are lazy: a dependency change only marks them
//!   dirty, and the cached value is recomputed on the next read.
//! - **User watchers** resolve a source against a component and invoke a
//!   callback with (new, old) when the result changes.
//!
//! # Evaluation Protocol
//!
//! Evaluating pushes the watcher onto the target stack, runs the getter
//! (every property read registers this watcher with its dep), pops the
//! stack, then reconciles the freshly collected dependency set against the
//! previous one: deps no longer touched are unsubscribed. After any
//! evaluation the active set is exactly the set of properties the getter
//! actually read, so a dependency behind an untaken branch cannot trigger
//! a re-run.
//!
//! Two set pairs make the diff cheap: `deps`/`dep_ids` hold the previous
//! evaluation's result, `new_deps`/`new_dep_ids` collect during the
//! current one, and the pairs swap on cleanup. The id sets deduplicate
//! within a pass, so a property read ten times subscribes once.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::{context, scheduler, traverse::traverse};
use crate::component::{self, ComponentId};
use crate::error::{self, Error};
use crate::observe::Dep;
use crate::value::Value;

/// Counter for generating unique watcher IDs.
///
/// Creation order is flush order: the scheduler sorts pending watchers by
/// this id, which runs parents before children and producers before
/// consumers.
static WATCHER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_watcher_id() -> u64 {
    WATCHER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A watcher's computation. Property reads inside the getter register the
/// evaluating watcher automatically.
pub type Getter = Arc<dyn Fn() -> Result<Value, Error> + Send + Sync>;

/// A user watcher's callback, invoked with (new, old).
pub type Callback = Arc<dyn Fn(&Value, &Value) -> Result<(), Error> + Send + Sync>;

/// Behavior flags for a watcher. The defaults describe a plain scheduled
/// watcher; the constructors in [`crate::watch`] set the right
/// combinations for the three configurations.
#[derive(Clone, Copy, Default)]
pub struct WatcherOptions {
    /// Traverse the result recursively after evaluation, so every nested
    /// reactive property becomes a dependency.
    pub deep: bool,
    /// User-created watcher: getter failures are reported against it.
    pub user: bool,
    /// Lazy (computed) watcher: dependency changes mark dirty instead of
    /// scheduling.
    pub lazy: bool,
    /// Run synchronously on notify instead of queuing.
    pub sync: bool,
    /// Render watcher: owner receives the updated hook after a flush that
    /// ran this watcher.
    pub render: bool,
}

/// One reactive computation and its current dependency set.
pub struct Watcher {
    id: u64,
    /// Handle to self for subscribing into deps and the scheduler.
    weak_self: Weak<Watcher>,
    owner: Option<ComponentId>,
    /// Human-readable source description, for diagnostics.
    expression: String,
    getter: Getter,
    cb: Option<Callback>,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    render: bool,
    active: AtomicBool,
    /// Lazy watchers only: cache is stale and must recompute on next read.
    dirty: AtomicBool,
    deps: RwLock<SmallVec<[Dep; 4]>>,
    new_deps: RwLock<SmallVec<[Dep; 4]>>,
    dep_ids: RwLock<HashSet<u64>>,
    new_dep_ids: RwLock<HashSet<u64>>,
    value: RwLock<Value>,
}

impl Watcher {
    /// Create a watcher and, unless lazy, evaluate it immediately to
    /// establish its initial value and dependency set.
    ///
    /// The watcher is registered with its owner's watcher list, if any, so
    /// component teardown can reach it.
    pub fn new(
        owner: Option<ComponentId>,
        getter: Getter,
        cb: Option<Callback>,
        expression: impl Into<String>,
        options: WatcherOptions,
    ) -> Arc<Watcher> {
        let watcher = Arc::new_cyclic(|weak| Watcher {
            id: next_watcher_id(),
            weak_self: weak.clone(),
            owner,
            expression: expression.into(),
            getter,
            cb,
            deep: options.deep,
            user: options.user,
            lazy: options.lazy,
            sync: options.sync,
            render: options.render,
            active: AtomicBool::new(true),
            dirty: AtomicBool::new(options.lazy),
            deps: RwLock::new(SmallVec::new()),
            new_deps: RwLock::new(SmallVec::new()),
            dep_ids: RwLock::new(HashSet::new()),
            new_dep_ids: RwLock::new(HashSet::new()),
            value: RwLock::new(Value::Null),
        });

        if let Some(owner) = owner {
            component::register_watcher(owner, watcher.clone());
        }
        if !options.lazy {
            let value = watcher.get();
            *watcher.value.write() = value;
        }
        watcher
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> Option<ComponentId> {
        self.owner
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn is_render(&self) -> bool {
        self.render
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// The value from the most recent evaluation (`Null` before one).
    pub fn value(&self) -> Value {
        self.value.read().clone()
    }

    /// Number of deps in the active dependency set.
    pub fn dep_count(&self) -> usize {
        self.deps.read().len()
    }

    /// Evaluate the getter, collecting dependencies.
    ///
    /// A failing getter is routed through the error channel and yields
    /// `Null`; the target frame is popped and the dependency sets are
    /// reconciled on every exit path, so a failure cannot leak dependency
    /// attribution into whatever evaluates next.
    pub(crate) fn get(&self) -> Value {
        let value = {
            let _guard = context::push_target(self.weak_self.upgrade());
            let value = match (self.getter)() {
                Ok(value) => value,
                Err(err) => {
                    let kind = if self.user { "user watcher" } else { "watcher" };
                    let info = format!("getter for {kind} \"{}\"", self.expression);
                    error::handle_error(&err, self.owner, &info);
                    Value::Null
                }
            };
            // Touch everything below while this watcher is still the
            // target, so nested properties join the dependency set.
            if self.deep {
                traverse(&value);
            }
            value
        };
        self.cleanup_deps();
        value
    }

    /// Record a dep touched during the current evaluation and subscribe to
    /// it if the previous evaluation did not already.
    pub(crate) fn add_dep(&self, dep: Dep) {
        let id = dep.id();
        {
            let mut new_ids = self.new_dep_ids.write();
            if new_ids.contains(&id) {
                return;
            }
            new_ids.insert(id);
        }
        self.new_deps.write().push(dep.clone());
        if !self.dep_ids.read().contains(&id) {
            dep.add_sub(&self.weak_self);
        }
    }

    /// Reconcile dependency sets after an evaluation: unsubscribe from
    /// deps the getter no longer touched, then promote the new sets.
    fn cleanup_deps(&self) {
        {
            let deps = self.deps.read();
            let new_ids = self.new_dep_ids.read();
            for dep in deps.iter() {
                if !new_ids.contains(&dep.id()) {
                    dep.remove_sub(self.id);
                }
            }
        }
        {
            let mut deps = self.deps.write();
            let mut new_deps = self.new_deps.write();
            std::mem::swap(&mut *deps, &mut *new_deps);
            new_deps.clear();
        }
        {
            let mut dep_ids = self.dep_ids.write();
            let mut new_dep_ids = self.new_dep_ids.write();
            std::mem::swap(&mut *dep_ids, &mut *new_dep_ids);
            new_dep_ids.clear();
        }
    }

    /// Dependency-changed entry point, called by deps on notify.
    pub(crate) fn update(&self) {
        if self.lazy {
            self.dirty.store(true, Ordering::SeqCst);
        } else if self.sync {
            self.run();
        } else if let Some(this) = self.weak_self.upgrade() {
            scheduler::queue_watcher(this);
        }
    }

    /// Re-evaluate and fire the callback if the result changed.
    ///
    /// The callback also fires when the value is a container (identity
    /// comparison cannot see interior mutation) or the watcher is deep.
    pub(crate) fn run(&self) {
        if !self.is_active() {
            return;
        }
        let value = self.get();
        let old = { self.value.read().clone() };
        if !value.same_value(&old) || value.is_container() || self.deep {
            *self.value.write() = value.clone();
            if let Some(cb) = &self.cb {
                let info = format!("callback for watcher \"{}\"", self.expression);
                error::invoke_callback(cb, &value, &old, self.owner, &info);
            }
        }
    }

    /// Lazy watchers only: recompute the cached value and mark clean.
    pub(crate) fn evaluate(&self) {
        let value = self.get();
        *self.value.write() = value;
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Attach this watcher's deps to the currently evaluating watcher.
    ///
    /// Reading a computed value inside another watcher must make the outer
    /// watcher depend on everything the computed depends on; derivation
    /// layers propagate by re-attaching the underlying deps.
    pub(crate) fn depend(&self) {
        let deps: Vec<Dep> = self.deps.read().iter().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep and deregister from the owner.
    ///
    /// Idempotent, and safe to call after the owner is already gone.
    pub fn teardown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(owner) = self.owner {
            component::remove_watcher(owner, self.id);
        }
        let deps: Vec<Dep> = {
            let mut deps = self.deps.write();
            deps.drain(..).collect()
        };
        for dep in deps {
            dep.remove_sub(self.id);
        }
        self.dep_ids.write().clear();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("expression", &self.expression)
            .field("active", &self.is_active())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn sync_options() -> WatcherOptions {
        WatcherOptions {
            sync: true,
            ..Default::default()
        }
    }

    #[test]
    fn watcher_ids_increase_with_creation_order() {
        let getter: Getter = Arc::new(|| Ok(Value::Null));
        let a = Watcher::new(None, getter.clone(), None, "a", sync_options());
        let b = Watcher::new(None, getter, None, "b", sync_options());
        assert!(a.id() < b.id());
    }

    #[test]
    fn evaluation_collects_exactly_the_deps_read() {
        let left = Dep::new();
        let right = Dep::new();
        let use_left = Arc::new(AtomicBool::new(true));

        let left_clone = left.clone();
        let right_clone = right.clone();
        let flag = use_left.clone();
        let watcher = Watcher::new(
            None,
            Arc::new(move || {
                if flag.load(Ordering::SeqCst) {
                    left_clone.depend();
                } else {
                    right_clone.depend();
                }
                Ok(Value::Null)
            }),
            None,
            "branch",
            sync_options(),
        );

        assert_eq!(watcher.dep_count(), 1);
        assert_eq!(left.subscriber_count(), 1);
        assert_eq!(right.subscriber_count(), 0);

        use_left.store(false, Ordering::SeqCst);
        left.notify();

        assert_eq!(left.subscriber_count(), 0);
        assert_eq!(right.subscriber_count(), 1);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let dep = Dep::new();
        let dep_clone = dep.clone();
        let watcher = Watcher::new(
            None,
            Arc::new(move || {
                dep_clone.depend();
                dep_clone.depend();
                dep_clone.depend();
                Ok(Value::Null)
            }),
            None,
            "repeat",
            sync_options(),
        );

        assert_eq!(watcher.dep_count(), 1);
        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn lazy_watcher_marks_dirty_instead_of_running() {
        let dep = Dep::new();
        let runs = Arc::new(AtomicI32::new(0));

        let dep_clone = dep.clone();
        let runs_clone = runs.clone();
        let watcher = Watcher::new(
            None,
            Arc::new(move || {
                dep_clone.depend();
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(1))
            }),
            None,
            "lazy",
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        );

        // Lazy watchers do not evaluate at creation.
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(watcher.is_dirty());

        watcher.evaluate();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!watcher.is_dirty());

        dep.notify();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(watcher.is_dirty());
    }

    #[test]
    fn teardown_unsubscribes_and_is_idempotent() {
        let dep = Dep::new();
        let runs = Arc::new(AtomicI32::new(0));

        let dep_clone = dep.clone();
        let runs_clone = runs.clone();
        let watcher = Watcher::new(
            None,
            Arc::new(move || {
                dep_clone.depend();
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }),
            None,
            "teardown",
            sync_options(),
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(dep.subscriber_count(), 1);

        watcher.teardown();
        assert_eq!(dep.subscriber_count(), 0);

        dep.notify();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        watcher.teardown();
        assert!(!watcher.is_active());
    }

    #[test]
    fn failing_getter_leaves_target_stack_clean() {
        let watcher = Watcher::new(
            None,
            Arc::new(|| Err(Error::Evaluation("boom".to_string()))),
            None,
            "failing",
            WatcherOptions {
                user: true,
                sync: true,
                ..Default::default()
            },
        );

        assert_eq!(watcher.value(), Value::Null);
        assert!(!context::is_tracking());
    }
}
