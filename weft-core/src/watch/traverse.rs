//! Deep Traversal
//!
//! A deep watcher must re-run when anything below its value changes, not
//! just the value itself. After the getter returns, the result is walked
//! while the watcher is still the tracking target: every nested property
//! read registers the watcher with that property's dep.
//!
//! A seen-set of container dep ids guards against cycles in the value
//! graph, so self-referential trees terminate.

use std::collections::HashSet;

use crate::value::Value;

/// Touch every reactive property reachable from `value`.
pub(crate) fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<u64>) {
    match value {
        Value::Object(obj) => {
            if let Some(ob) = obj.observer() {
                if !seen.insert(ob.dep().id()) {
                    return;
                }
            }
            // Tracked reads: keys() is the shape dependency, get() the
            // per-key ones.
            for key in obj.keys() {
                let child = obj.get(&key);
                traverse_inner(&child, seen);
            }
        }
        Value::Array(arr) => {
            if let Some(ob) = arr.observer() {
                if !seen.insert(ob.dep().id()) {
                    return;
                }
            }
            for item in arr.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{observe, Obj};

    #[test]
    fn traversal_terminates_on_cycles() {
        let root = Obj::new();
        root.set("self", Value::Object(root.clone()));
        observe(&Value::Object(root.clone()));

        // Must not loop forever.
        traverse(&Value::Object(root));
    }

    #[test]
    fn traversal_visits_nested_values() {
        let value: Value = serde_json::json!({"a": {"b": [1, {"c": 2}]}}).into();
        observe(&value);
        traverse(&value);
    }
}
