//! Observable Array
//!
//! Per-index accessor pairs are uneconomical, so `Arr` is a dedicated
//! collection type instead: the seven mutating operations (`push`, `pop`,
//! `shift`, `unshift`, `splice`, `sort_by`, `reverse`) each perform the
//! operation, observe any newly inserted elements, and notify the array's
//! own dep exactly once per call regardless of how many elements changed.
//!
//! Reads (`len`, `get`, `to_vec`) register the evaluating watcher with the
//! array's dep, so any later shape change re-runs the readers.

use std::cmp::Ordering as CmpOrdering;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::Observer;
use crate::value::Value;
use crate::watch::context;

/// A shared, optionally observed array of reactive values.
///
/// Cloning an `Arr` clones a handle onto the same storage.
#[derive(Clone)]
pub struct Arr {
    inner: Arc<ArrInner>,
}

struct ArrInner {
    items: RwLock<Vec<Value>>,
    observer: OnceLock<Observer>,
}

impl Arr {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(ArrInner {
                items: RwLock::new(items),
                observer: OnceLock::new(),
            }),
        }
    }

    /// Whether two handles share the same storage.
    pub fn ptr_eq(&self, other: &Arr) -> bool {
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

    pub fn len(&self) -> usize {
        self.track();
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Read an element; out-of-bounds yields `Null`.
    pub fn get(&self, index: usize) -> Value {
        self.track();
        self.inner
            .items
            .read()
            .get(index)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Tracked copy of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.inner.items.read().clone()
    }

    /// Untracked copy, for snapshots and traversal setup.
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    /// Append an element.
    pub fn push(&self, value: Value) {
        self.observe_inserted(std::slice::from_ref(&value));
        self.inner.items.write().push(value);
        self.notify();
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        let removed = { self.inner.items.write().pop() };
        self.notify();
        removed
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        let removed = {
            let mut items = self.inner.items.write();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.notify();
        removed
    }

    /// Insert an element at the front.
    pub fn unshift(&self, value: Value) {
        self.observe_inserted(std::slice::from_ref(&value));
        self.inner.items.write().insert(0, value);
        self.notify();
    }

    /// Remove `delete_count` elements starting at `start` (both clamped to
    /// the current length) and insert `inserted` in their place. Returns
    /// the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, inserted: Vec<Value>) -> Vec<Value> {
        self.observe_inserted(&inserted);
        let removed = {
            let mut items = self.inner.items.write();
            let start = start.min(items.len());
            let end = (start + delete_count).min(items.len());
            items.splice(start..end, inserted).collect()
        };
        self.notify();
        removed
    }

    /// Sort in place with a caller-supplied comparator.
    ///
    /// The comparator runs outside the storage lock and must not mutate
    /// this array.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        let mut items = { std::mem::take(&mut *self.inner.items.write()) };
        items.sort_by(compare);
        *self.inner.items.write() = items;
        self.notify();
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.inner.items.write().reverse();
        self.notify();
    }

    fn track(&self) {
        if context::is_tracking() {
            if let Some(ob) = self.observer() {
                ob.dep().depend();
            }
        }
    }

    fn observe_inserted(&self, items: &[Value]) {
        if let Some(ob) = self.observer() {
            if !ob.is_shallow() {
                for item in items {
                    super::observe(item);
                }
            }
        }
    }

    fn notify(&self) {
        if let Some(ob) = self.observer() {
            ob.dep().notify();
        }
    }
}

impl Default for Arr {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Arr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arr")
            .field("len", &self.len_untracked())
            .field("observed", &self.is_observed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(items: &[i64]) -> Arr {
        Arr::from_vec(items.iter().map(|n| Value::from(*n)).collect())
    }

    #[test]
    fn push_pop_shift_unshift() {
        let arr = Arr::new();
        arr.push(Value::from(1));
        arr.push(Value::from(2));
        arr.unshift(Value::from(0));

        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0), Value::from(0));
        assert_eq!(arr.pop(), Some(Value::from(2)));
        assert_eq!(arr.shift(), Some(Value::from(0)));
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn splice_removes_and_inserts() {
        let arr = numbers(&[1, 2, 3, 4]);
        let removed = arr.splice(1, 2, vec![Value::from(9)]);

        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(arr.to_vec(), vec![Value::from(1), Value::from(9), Value::from(4)]);
    }

    #[test]
    fn splice_clamps_out_of_range() {
        let arr = numbers(&[1, 2]);
        let removed = arr.splice(5, 5, vec![Value::from(3)]);

        assert!(removed.is_empty());
        assert_eq!(arr.to_vec(), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn sort_and_reverse() {
        let arr = numbers(&[3, 1, 2]);
        arr.sort_by(|a, b| {
            a.as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(CmpOrdering::Equal)
        });
        assert_eq!(arr.to_vec(), vec![Value::from(1), Value::from(2), Value::from(3)]);

        arr.reverse();
        assert_eq!(arr.to_vec(), vec![Value::from(3), Value::from(2), Value::from(1)]);
    }

    #[test]
    fn inserted_elements_are_observed() {
        let arr = Arr::new();
        crate::observe::observe(&Value::Array(arr.clone()));

        let element = crate::observe::Obj::new();
        arr.push(Value::Object(element.clone()));
        assert!(element.is_observed());
    }

    #[test]
    fn out_of_bounds_read_is_null() {
        let arr = numbers(&[1]);
        assert_eq!(arr.get(10), Value::Null);
    }
}
