//! Component Arena
//!
//! Components are the owners in the reactive graph: each instance holds an
//! observed data object, the watchers created against it, an optional
//! render watcher, and the provide/inject surfaces that connect it to its
//! ancestors.
//!
//! Instances live in a process-wide registry addressed by stable
//! [`ComponentId`]s; each holds a non-owning parent id rather than a back
//! reference, so ownership chains carry no lifetime entanglement and a
//! destroyed ancestor simply ends the walk.
//!
//! # Construction Order
//!
//! 1. Injections resolve against the ancestor chain, before this
//!    instance's own provided map exists, so a component never satisfies
//!    its own injections.
//! 2. The data object is observed.
//! 3. `provide` (map or factory run against the instance) becomes the
//!    provided map, immutable for the component's lifetime.
//!
//! Watchers come afterwards, through [`crate::watch`].

pub mod inject;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;

use self::inject::{resolve_inject, Injection, ProvideSource};
use crate::config;
use crate::error::{self, Error};
use crate::observe::{self, Obj};
use crate::value::Value;
use crate::watch::watcher::Watcher;

/// Counter for generating unique component IDs.
static COMPONENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stable address of a component instance in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        Self(COMPONENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Lifecycle hook delivered after a flush that re-ran the component's
/// render watcher.
pub type UpdatedHook = Arc<dyn Fn(ComponentId) -> Result<(), Error> + Send + Sync>;

/// Error-capture hook: receives the error, the component it surfaced
/// from, and the invocation-site description. Returning `true` marks the
/// error handled and stops propagation toward the root.
pub type ErrorCapturedHook = Arc<dyn Fn(&Error, ComponentId, &str) -> bool + Send + Sync>;

/// Declaration for a new component instance.
#[derive(Default)]
pub struct ComponentOptions {
    pub parent: Option<ComponentId>,
    /// Initial reactive state; expected to be an object value. `Null`
    /// means an empty object; anything else warns and is replaced by one.
    pub data: Value,
    pub provide: Option<ProvideSource>,
    pub inject: Vec<Injection>,
    pub updated: Option<UpdatedHook>,
    pub error_captured: Vec<ErrorCapturedHook>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: ComponentId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    pub fn provide(mut self, provide: ProvideSource) -> Self {
        self.provide = Some(provide);
        self
    }

    pub fn inject(mut self, injection: Injection) -> Self {
        self.inject.push(injection);
        self
    }

    pub fn updated<F>(mut self, hook: F) -> Self
    where
        F: Fn(ComponentId) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.updated = Some(Arc::new(hook));
        self
    }

    pub fn error_captured<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Error, ComponentId, &str) -> bool + Send + Sync + 'static,
    {
        self.error_captured.push(Arc::new(hook));
        self
    }
}

/// One live component instance.
pub struct Component {
    id: ComponentId,
    parent: Option<ComponentId>,
    data: Obj,
    injected: Obj,
    /// Provided-values map, set once after construction.
    provided: OnceLock<IndexMap<String, Value>>,
    watchers: RwLock<Vec<Arc<Watcher>>>,
    render_watcher: RwLock<Option<Arc<Watcher>>>,
    updated: Option<UpdatedHook>,
    error_captured: Vec<ErrorCapturedHook>,
}

static REGISTRY: OnceLock<DashMap<u64, Arc<Component>>> = OnceLock::new();

fn registry() -> &'static DashMap<u64, Arc<Component>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Create a component instance and register it.
pub fn create_component(options: ComponentOptions) -> ComponentId {
    let ComponentOptions {
        parent,
        data,
        provide,
        inject,
        updated,
        error_captured,
    } = options;

    let id = ComponentId::next();

    let resolved = resolve_inject(&inject, parent);
    let injected = Obj::from_entries(resolved);
    observe::observe_shallow(&Value::Object(injected.clone()));

    let data = match data {
        Value::Object(obj) => obj,
        Value::Null => Obj::new(),
        _ => {
            config::dev_warn("component data should be an object value");
            Obj::new()
        }
    };
    observe::observe(&Value::Object(data.clone()));

    let component = Arc::new(Component {
        id,
        parent,
        data,
        injected,
        provided: OnceLock::new(),
        watchers: RwLock::new(Vec::new()),
        render_watcher: RwLock::new(None),
        updated,
        error_captured,
    });
    registry().insert(id.raw(), component.clone());

    if let Some(source) = provide {
        let map = match source {
            ProvideSource::Map(map) => map,
            ProvideSource::Factory(factory) => factory(&component),
        };
        let _ = component.provided.set(map);
    }

    id
}

/// Look up a live component.
pub fn get_component(id: ComponentId) -> Option<Arc<Component>> {
    registry().get(&id.raw()).map(|entry| entry.value().clone())
}

/// Tear down a component: every watcher it owns is torn down and the
/// instance leaves the registry. Idempotent; unknown ids are ignored.
/// Descendants are not destroyed; their ancestor walks simply end here.
pub fn destroy_component(id: ComponentId) {
    let Some(component) = registry().remove(&id.raw()).map(|(_, c)| c) else {
        return;
    };
    let watchers: Vec<Arc<Watcher>> = { component.watchers.write().drain(..).collect() };
    for watcher in watchers {
        watcher.teardown();
    }
    *component.render_watcher.write() = None;
}

impl Component {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    /// The component's observed state object.
    pub fn data(&self) -> &Obj {
        &self.data
    }

    /// Resolved injections, installed as reactive properties.
    ///
    /// Injected values are owned by their provider: a consumer writing
    /// through this object is stepping outside the contract and will be
    /// overwritten whenever the provider re-establishes the value.
    pub fn injected(&self) -> &Obj {
        &self.injected
    }

    pub fn render_watcher(&self) -> Option<Arc<Watcher>> {
        self.render_watcher.read().clone()
    }

    /// Number of live watchers owned by this component.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    pub(crate) fn provided_value(&self, key: &str) -> Option<Value> {
        self.provided.get().and_then(|map| map.get(key).cloned())
    }

    pub(crate) fn error_captured_hooks(&self) -> &[ErrorCapturedHook] {
        &self.error_captured
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id.raw())
            .field("parent", &self.parent.map(|p| p.raw()))
            .field("watcher_count", &self.watcher_count())
            .finish()
    }
}

pub(crate) fn register_watcher(id: ComponentId, watcher: Arc<Watcher>) {
    if let Some(component) = get_component(id) {
        component.watchers.write().push(watcher);
    }
}

pub(crate) fn remove_watcher(id: ComponentId, watcher_id: u64) {
    if let Some(component) = get_component(id) {
        component
            .watchers
            .write()
            .retain(|watcher| watcher.id() != watcher_id);
    }
}

pub(crate) fn set_render_watcher(id: ComponentId, watcher: Arc<Watcher>) {
    if let Some(component) = get_component(id) {
        *component.render_watcher.write() = Some(watcher);
    }
}

/// Deliver the `updated` hook after a flush, routing a failure through the
/// error channel.
pub(crate) fn call_updated_hook(id: ComponentId) {
    let Some(component) = get_component(id) else {
        return;
    };
    if let Some(hook) = &component.updated {
        if let Err(err) = hook(id) {
            error::handle_error(&err, Some(id), "updated hook");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_observes_data() {
        let id = create_component(ComponentOptions::new().data(Value::from(json!({"a": 1}))));
        let component = get_component(id).unwrap();

        assert!(component.data().is_observed());
        assert_eq!(component.data().get("a"), Value::from(1));

        destroy_component(id);
        assert!(get_component(id).is_none());
    }

    #[test]
    fn destroy_is_idempotent() {
        let id = create_component(ComponentOptions::new());
        destroy_component(id);
        destroy_component(id);
    }

    #[test]
    fn non_object_data_warns_and_becomes_empty() {
        let id = create_component(ComponentOptions::new().data(Value::from(5)));
        let component = get_component(id).unwrap();
        assert_eq!(component.data().len(), 0);
        destroy_component(id);
    }

    #[test]
    fn own_provide_does_not_satisfy_own_inject() {
        let id = create_component(
            ComponentOptions::new()
                .provide(ProvideSource::map([("key".to_string(), Value::from(1))]))
                .inject(Injection::new("key").with_default(9)),
        );
        let component = get_component(id).unwrap();
        assert_eq!(component.injected().get("key"), Value::from(9));
        destroy_component(id);
    }

    #[test]
    fn provide_factory_sees_the_instance() {
        let parent = create_component(
            ComponentOptions::new()
                .data(Value::from(json!({"limit": 3})))
                .provide(ProvideSource::factory(|component| {
                    [("limit".to_string(), component.data().get("limit"))]
                        .into_iter()
                        .collect()
                })),
        );
        let child = create_component(
            ComponentOptions::new()
                .parent(parent)
                .inject(Injection::new("limit")),
        );

        let component = get_component(child).unwrap();
        assert_eq!(component.injected().get("limit"), Value::from(3));

        destroy_component(child);
        destroy_component(parent);
    }
}
