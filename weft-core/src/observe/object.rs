//! Reactive Object
//!
//! `Obj` is the explicit-wrapper rendition of an instrumented object: a
//! shared, insertion-ordered map whose reads and writes go through `get` /
//! `set` instead of raw field access. Once an observer is attached (see
//! [`observe`](super::observe)), every key owns a dep, reads register the
//! evaluating watcher, and writes notify exactly the watchers that read
//! that key.
//!
//! An unobserved `Obj` behaves as plain storage; observation is what turns
//! the same handle reactive.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::Observer;
use crate::value::Value;
use crate::watch::context;

/// A shared, optionally observed object of named reactive properties.
///
/// Cloning an `Obj` clones a handle: all clones read and write the same
/// entries and share the same observer.
#[derive(Clone)]
pub struct Obj {
    inner: Arc<ObjInner>,
}

struct ObjInner {
    entries: RwLock<IndexMap<String, Value>>,
    observer: OnceLock<Observer>,
}

impl Obj {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObjInner {
                entries: RwLock::new(IndexMap::new()),
                observer: OnceLock::new(),
            }),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            inner: Arc::new(ObjInner {
                entries: RwLock::new(entries.into_iter().collect()),
                observer: OnceLock::new(),
            }),
        }
    }

    /// Whether two handles share the same storage.
    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_observed(&self) -> bool {
        self.inner.observer.get().is_some()
    }

    pub(crate) fn observer(&self) -> Option<Observer> {
        self.inner.observer.get().cloned()
    }

    pub(crate) fn attach_observer(&self, shallow: bool) -> Observer {
        self.inner
            .observer
            .get_or_init(|| Observer::new(shallow))
            .clone()
    }

    /// Read a property, registering the evaluating watcher with the key's
    /// dep. Reading an absent key yields `Null` and registers nothing.
    ///
    /// If the stored value is itself an observed container, the evaluating
    /// watcher also subscribes to that container's own dep, so shape
    /// changes (added keys, array mutations) are observed through the
    /// parent read.
    pub fn get(&self, key: &str) -> Value {
        let value = { self.inner.entries.read().get(key).cloned() };

        if context::is_tracking() {
            if let Some(ob) = self.observer() {
                if let Some(dep) = ob.key_dep(key) {
                    dep.depend();
                }
                match &value {
                    Some(Value::Object(child)) => {
                        if let Some(child_ob) = child.observer() {
                            child_ob.dep().depend();
                        }
                    }
                    Some(Value::Array(child)) => {
                        if let Some(child_ob) = child.observer() {
                            child_ob.dep().depend();
                        }
                        super::depend_array(child);
                    }
                    _ => {}
                }
            }
        }

        value.unwrap_or(Value::Null)
    }

    /// Write a property.
    ///
    /// A write that stores an equal value (identity for containers,
    /// NaN-aware for numbers) notifies nobody. Writing an existing key
    /// notifies that key's dep; writing a new key is property addition and
    /// notifies the owner-level dep instead, since no watcher can have
    /// subscribed to a key that did not exist.
    pub fn set(&self, key: &str, value: Value) {
        let existed = {
            let mut entries = self.inner.entries.write();
            match entries.get_mut(key) {
                Some(slot) => {
                    if slot.same_value(&value) {
                        return;
                    }
                    *slot = value.clone();
                    true
                }
                None => {
                    entries.insert(key.to_string(), value.clone());
                    false
                }
            }
        };

        let Some(ob) = self.observer() else { return };
        if !ob.is_shallow() {
            super::observe(&value);
        }
        if existed {
            ob.ensure_key_dep(key).notify();
        } else {
            ob.ensure_key_dep(key);
            ob.dep().notify();
        }
    }

    /// Remove a property, notifying the owner-level dep. Removing an
    /// absent key notifies nothing.
    pub fn del(&self, key: &str) {
        let removed = { self.inner.entries.write().shift_remove(key) };
        if removed.is_some() {
            if let Some(ob) = self.observer() {
                ob.dep().notify();
            }
        }
    }

    /// Current keys, registering the evaluating watcher with the
    /// owner-level dep: enumeration is a shape dependency.
    pub fn keys(&self) -> Vec<String> {
        self.track_shape();
        self.inner.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.track_shape();
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.track_shape();
        self.inner.entries.read().contains_key(key)
    }

    pub(crate) fn contains_key_untracked(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    /// Untracked copy of the entries, for snapshots and traversal setup.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn track_shape(&self) {
        if context::is_tracking() {
            if let Some(ob) = self.observer() {
                ob.dep().depend();
            }
        }
    }
}

impl Default for Obj {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Obj")
            .field("len", &self.inner.entries.read().len())
            .field("observed", &self.is_observed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_returns_value() {
        let obj = Obj::new();
        obj.set("a", Value::from(1));
        assert_eq!(obj.get("a"), Value::from(1));

        obj.set("a", Value::from("text"));
        assert_eq!(obj.get("a"), Value::from("text"));
    }

    #[test]
    fn absent_key_reads_null() {
        let obj = Obj::new();
        assert_eq!(obj.get("missing"), Value::Null);
    }

    #[test]
    fn del_removes_entry() {
        let obj = Obj::from_entries([("a".to_string(), Value::from(1))]);
        obj.del("a");
        assert_eq!(obj.get("a"), Value::Null);
        assert!(!obj.contains_key_untracked("a"));
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let obj = Obj::new();
        obj.set("b", Value::from(1));
        obj.set("a", Value::from(2));
        obj.set("c", Value::from(3));
        assert_eq!(obj.keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn set_observes_new_value_when_observed() {
        let obj = Obj::new();
        crate::observe::observe(&Value::Object(obj.clone()));

        let child = Obj::new();
        obj.set("child", Value::Object(child.clone()));
        assert!(child.is_observed());
    }

    #[test]
    fn shallow_owner_does_not_observe_new_values() {
        let obj = Obj::new();
        crate::observe::observe_shallow(&Value::Object(obj.clone()));

        let child = Obj::new();
        obj.set("child", Value::Object(child.clone()));
        assert!(!child.is_observed());
    }
}
