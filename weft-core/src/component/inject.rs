//! Provide / Inject Resolution
//!
//! A component may declare `provide`, values its descendants can look up
//! without parameter threading, and `inject`, the lookups it wants. At
//! construction, `provide` (a static map or a factory run against the
//! instance) becomes the component's provided-values map, fixed for its
//! lifetime. Each `inject` entry resolves by walking the ownership chain
//! upward: the first ancestor providing the `from` key wins. With no
//! provider, a declared default (literal or factory) applies; with no
//! default either, the entry is absent and a development warning is
//! emitted.
//!
//! Resolved values land on the component's injection object, observed
//! shallowly: reads register dependencies like any reactive property, but
//! the values' insides stay under the provider's control. The provider is
//! the sole legitimate writer of an injected value; consumers mutating one
//! will be overwritten whenever the provider re-establishes it.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{get_component, Component, ComponentId};
use crate::config;
use crate::value::Value;

/// What a component makes available to its descendants.
#[derive(Clone)]
pub enum ProvideSource {
    /// A fixed map of provided values.
    Map(IndexMap<String, Value>),
    /// A factory evaluated once against the constructed instance; its
    /// result becomes the provided map.
    Factory(Arc<dyn Fn(&Component) -> IndexMap<String, Value> + Send + Sync>),
}

impl ProvideSource {
    pub fn map(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        ProvideSource::Map(entries.into_iter().collect())
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Component) -> IndexMap<String, Value> + Send + Sync + 'static,
    {
        ProvideSource::Factory(Arc::new(factory))
    }
}

/// Fallback for an injection with no matching provider.
#[derive(Clone)]
pub enum InjectDefault {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

/// One injection declaration: install the value provided under `from` as
/// the local property `key`.
#[derive(Clone)]
pub struct Injection {
    pub key: String,
    pub from: String,
    pub default: Option<InjectDefault>,
}

impl Injection {
    /// Inject the provider key `key` under the same local name.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            from: key.clone(),
            key,
            default: None,
        }
    }

    /// Look up a different provider key than the local name.
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(InjectDefault::Value(value.into()));
        self
    }

    pub fn with_default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(InjectDefault::Factory(Arc::new(factory)));
        self
    }
}

/// Resolve a set of injections against the ownership chain starting at
/// `start` (the requesting instance's parent during construction; the
/// instance's own provided map does not exist yet).
pub(crate) fn resolve_inject(
    entries: &[Injection],
    start: Option<ComponentId>,
) -> IndexMap<String, Value> {
    let mut result = IndexMap::new();

    for entry in entries {
        let mut source = start;
        let mut found = false;
        while let Some(id) = source {
            let Some(component) = get_component(id) else {
                break;
            };
            if let Some(value) = component.provided_value(&entry.from) {
                result.insert(entry.key.clone(), value);
                found = true;
                break;
            }
            source = component.parent();
        }

        if !found {
            match &entry.default {
                Some(InjectDefault::Value(value)) => {
                    result.insert(entry.key.clone(), value.clone());
                }
                Some(InjectDefault::Factory(factory)) => {
                    result.insert(entry.key.clone(), factory());
                }
                None => {
                    config::dev_warn(&format!("injection \"{}\" not found", entry.from));
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{create_component, destroy_component, ComponentOptions};

    #[test]
    fn nearest_provider_wins() {
        let grandparent = create_component(
            ComponentOptions::new()
                .provide(ProvideSource::map([("depth".to_string(), Value::from(1))])),
        );
        let parent = create_component(
            ComponentOptions::new()
                .parent(grandparent)
                .provide(ProvideSource::map([("depth".to_string(), Value::from(2))])),
        );

        let resolved = resolve_inject(&[Injection::new("depth")], Some(parent));
        assert_eq!(resolved.get("depth"), Some(&Value::from(2)));

        destroy_component(parent);
        destroy_component(grandparent);
    }

    #[test]
    fn chain_walk_skips_non_providers() {
        let root = create_component(
            ComponentOptions::new()
                .provide(ProvideSource::map([("theme".to_string(), Value::from("dark"))])),
        );
        let middle = create_component(ComponentOptions::new().parent(root));

        let resolved = resolve_inject(&[Injection::new("theme")], Some(middle));
        assert_eq!(resolved.get("theme"), Some(&Value::from("dark")));

        destroy_component(middle);
        destroy_component(root);
    }

    #[test]
    fn default_applies_when_no_provider() {
        let resolved = resolve_inject(
            &[
                Injection::new("present").with_default(7),
                Injection::new("made").with_default_factory(|| Value::from("factory")),
            ],
            None,
        );
        assert_eq!(resolved.get("present"), Some(&Value::from(7)));
        assert_eq!(resolved.get("made"), Some(&Value::from("factory")));
    }

    #[test]
    fn missing_injection_is_absent_not_an_error() {
        let resolved = resolve_inject(&[Injection::new("nowhere")], None);
        assert!(resolved.is_empty());
    }

    #[test]
    fn renamed_injection_uses_from_key() {
        let provider = create_component(
            ComponentOptions::new()
                .provide(ProvideSource::map([("app.title".to_string(), Value::from("weft"))])),
        );

        let resolved = resolve_inject(
            &[Injection::new("title").from("app.title")],
            Some(provider),
        );
        assert_eq!(resolved.get("title"), Some(&Value::from("weft")));

        destroy_component(provider);
    }
}
