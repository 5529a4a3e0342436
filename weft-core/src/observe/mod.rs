//! Reactive Conversion
//!
//! This module turns plain value trees into instrumented ones. An
//! [`Observer`] attached to an object or array is the marker that its
//! reads and writes are observable; attaching recurses into nested
//! containers so a whole state tree becomes reactive in one call.
//!
//! # Concepts
//!
//! ## Observer
//!
//! One observer per container, attached lazily on first observation and
//! alive as long as the container. It owns the container-level dep (shape
//! changes: added/removed keys, array mutations) and one dep per object
//! key, created when the key is instrumented and never replaced.
//!
//! ## Property addition and removal
//!
//! A write through [`Obj::set`] to a key that already exists notifies that
//! key's subscribers. Keys that appear or disappear later cannot have
//! per-key subscribers yet, so [`set`] and [`del`] route those changes
//! through the container-level dep, which parent readers subscribe to
//! automatically when they read the container out of its owner.
//!
//! ## Shallow observation
//!
//! [`observe_shallow`] instruments a container without converting its
//! values, and values stored through it later stay unconverted. Injected
//! values are installed this way: they are readable dependencies at the
//! key level, but ownership of their insides stays with the provider.

mod array;
pub mod dep;
mod object;

pub use array::Arr;
pub use dep::Dep;
pub use object::Obj;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config;
use crate::value::Value;

/// The instrumentation attached to one observed container.
///
/// Cloning an `Observer` clones a handle to the same dep registry.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

struct ObserverInner {
    /// Container-level dep: shape changes and whole-collection mutations.
    dep: Dep,
    /// Per-key deps for observed objects. A key's dep is created when the
    /// key is instrumented and lives as long as the observer.
    key_deps: RwLock<HashMap<String, Dep>>,
    shallow: bool,
}

impl Observer {
    fn new(shallow: bool) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                dep: Dep::new(),
                key_deps: RwLock::new(HashMap::new()),
                shallow,
            }),
        }
    }

    /// The container-level dep.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    pub(crate) fn key_dep(&self, key: &str) -> Option<Dep> {
        self.inner.key_deps.read().get(key).cloned()
    }

    pub(crate) fn ensure_key_dep(&self, key: &str) -> Dep {
        if let Some(dep) = self.key_dep(key) {
            return dep;
        }
        self.inner
            .key_deps
            .write()
            .entry(key.to_string())
            .or_insert_with(Dep::new)
            .clone()
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.inner.dep.id())
            .field("shallow", &self.inner.shallow)
            .finish()
    }
}

/// Make a value reactive.
///
/// Objects and arrays not yet observed get an observer attached,
/// recursively; already-observed containers return their existing
/// observer unchanged. Non-container values are not observable and yield
/// `None` (silently; a skip, not an error).
pub fn observe(value: &Value) -> Option<Observer> {
    observe_with(value, false)
}

/// Make a container reactive without converting its contents.
///
/// The returned observer is marked shallow: nested values are left
/// unobserved now, and values stored through the container later are not
/// converted either.
pub fn observe_shallow(value: &Value) -> Option<Observer> {
    observe_with(value, true)
}

fn observe_with(value: &Value, shallow: bool) -> Option<Observer> {
    match value {
        Value::Object(obj) => Some(observe_obj(obj, shallow)),
        Value::Array(arr) => Some(observe_arr(arr, shallow)),
        _ => None,
    }
}

fn observe_obj(obj: &Obj, shallow: bool) -> Observer {
    if let Some(existing) = obj.observer() {
        return existing;
    }
    // Attach before walking so self-referential trees terminate.
    let ob = obj.attach_observer(shallow);
    for (key, value) in obj.snapshot() {
        ob.ensure_key_dep(&key);
        if !shallow {
            observe_with(&value, false);
        }
    }
    ob
}

fn observe_arr(arr: &Arr, shallow: bool) -> Observer {
    if let Some(existing) = arr.observer() {
        return existing;
    }
    let ob = arr.attach_observer(shallow);
    if !shallow {
        for item in arr.snapshot() {
            observe_with(&item, false);
        }
    }
    ob
}

/// Subscribe the evaluating watcher to every nested array inside `arr`.
///
/// Array elements are not tracked per index, so a read of an array that
/// contains arrays must also depend on those inner collections for their
/// shape changes to be observed through the outer read.
pub(crate) fn depend_array(arr: &Arr) {
    for item in arr.snapshot() {
        match &item {
            Value::Object(obj) => {
                if let Some(ob) = obj.observer() {
                    ob.dep().depend();
                }
            }
            Value::Array(inner) => {
                if let Some(ob) = inner.observer() {
                    ob.dep().depend();
                }
                depend_array(inner);
            }
            _ => {}
        }
    }
}

/// Add a reactive property to an observed container after the fact.
///
/// Plain insertion into an object is invisible to subscribers of existing
/// keys, so this instruments the key, observes the value, and notifies the
/// container-level dep. On arrays a numeric key routes through `splice`.
/// Other targets produce a development warning and no effect.
pub fn set(target: &Value, key: &str, value: Value) {
    match target {
        Value::Object(obj) => obj.set(key, value),
        Value::Array(arr) => match key.parse::<usize>() {
            Ok(index) => {
                let index = index.min(arr.len_untracked());
                arr.splice(index, 1, vec![value]);
            }
            Err(_) => {
                config::dev_warn(&format!("cannot set non-numeric array key \"{key}\""));
            }
        },
        _ => config::dev_warn("cannot set a reactive property on a non-container value"),
    }
}

/// Remove a reactive property, notifying the container-level dep.
pub fn del(target: &Value, key: &str) {
    match target {
        Value::Object(obj) => obj.del(key),
        Value::Array(arr) => match key.parse::<usize>() {
            Ok(index) => {
                if index < arr.len_untracked() {
                    arr.splice(index, 1, Vec::new());
                }
            }
            Err(_) => {
                config::dev_warn(&format!("cannot delete non-numeric array key \"{key}\""));
            }
        },
        _ => config::dev_warn("cannot delete a reactive property from a non-container value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn observe_recurses_into_nested_containers() {
        let value: Value = json!({"child": {"grand": 1}, "items": [{"x": 1}]}).into();
        observe(&value).expect("object is observable");

        let root = value.as_object().unwrap();
        assert!(root.is_observed());

        let child = root.get("child");
        assert!(child.as_object().unwrap().is_observed());

        let items = root.get("items");
        let items = items.as_array().unwrap();
        assert!(items.is_observed());
        assert!(items.get(0).as_object().unwrap().is_observed());
    }

    #[test]
    fn observe_is_idempotent() {
        let value: Value = json!({"a": 1}).into();
        let first = observe(&value).unwrap();
        let second = observe(&value).unwrap();
        assert_eq!(first.dep().id(), second.dep().id());
    }

    #[test]
    fn non_containers_are_skipped() {
        assert!(observe(&Value::Null).is_none());
        assert!(observe(&Value::from(1)).is_none());
        assert!(observe(&Value::from("text")).is_none());
        assert!(observe(&Value::from(true)).is_none());
    }

    #[test]
    fn shallow_observation_leaves_children_plain() {
        let value: Value = json!({"child": {"x": 1}}).into();
        let ob = observe_shallow(&value).unwrap();
        assert!(ob.is_shallow());

        let root = value.as_object().unwrap();
        let child = root.get("child");
        assert!(!child.as_object().unwrap().is_observed());
    }

    #[test]
    fn set_on_array_routes_through_splice() {
        let value: Value = json!([1, 2, 3]).into();
        observe(&value);
        set(&value, "1", Value::from(9));

        let arr = value.as_array().unwrap();
        assert_eq!(arr.get(1), Value::from(9));
        assert_eq!(arr.len_untracked(), 3);
    }

    #[test]
    fn del_on_array_removes_element() {
        let value: Value = json!([1, 2, 3]).into();
        del(&value, "0");
        assert_eq!(value.as_array().unwrap().len_untracked(), 2);
    }

    #[test]
    fn cyclic_trees_terminate() {
        let root = Obj::new();
        root.set("self", Value::Object(root.clone()));
        observe(&Value::Object(root.clone()));
        assert!(root.is_observed());
    }
}
