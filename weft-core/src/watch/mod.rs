//! Watchers
//!
//! This module implements the computation side of the engine: watchers
//! (render, computed, user), the evaluation context that makes dependency
//! discovery automatic, the deep-traversal helper, and the scheduler that
//! batches re-execution.
//!
//! # Concepts
//!
//! ## User watchers
//!
//! [`watch`] observes a source (a dotted path into a component's data, or
//! an arbitrary getter) and invokes a callback with (new, old) when the
//! result changes. Options cover `deep` (nested mutations count),
//! `immediate` (fire once at creation) and `sync` (bypass the scheduler).
//!
//! ## Computed values
//!
//! [`computed`] is the lazy configuration: a dependency change only marks
//! the watcher dirty, and the cached value recomputes on the next read.
//! Reading a computed inside another watcher chains the dependency
//! layers.
//!
//! ## Render watchers
//!
//! [`create_render_watcher`] hooks a component's render function to its
//! dependencies. The render layer supplies the function; the engine
//! guarantees it re-runs exactly when a dependency changed, deduplicated
//! per flush.

pub mod context;
pub mod scheduler;
mod traverse;
pub mod watcher;

pub use context::{is_tracking, untracked};
pub use scheduler::{has_pending, next_tick, tick, MAX_UPDATE_COUNT};
pub use watcher::{Callback, Getter, Watcher, WatcherOptions};

use std::sync::Arc;

use crate::component::{self, ComponentId};
use crate::config;
use crate::error::{self, Error};
use crate::value::Value;

/// Options accepted by [`watch`].
#[derive(Clone, Copy, Default)]
pub struct WatchOptions {
    /// Traverse the watched value so mutations anywhere below it fire the
    /// callback.
    pub deep: bool,
    /// Invoke the callback once synchronously at creation, with the
    /// current value and no old value.
    pub immediate: bool,
    /// Run the callback synchronously on notify instead of queuing.
    pub sync: bool,
}

/// What a user watcher observes.
pub enum WatchSource {
    /// A dotted identifier path resolved against the owner's data (then
    /// its injections). Anything but identifiers and dots warns and
    /// resolves to `Null`.
    Path(String),
    /// An arbitrary getter.
    Getter(Getter),
}

impl WatchSource {
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn() -> Result<Value, Error> + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(getter))
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> Self {
        WatchSource::Path(path.to_string())
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> Self {
        WatchSource::Path(path)
    }
}

/// Handle returned by [`watch`]; tears the watcher down on demand.
pub struct WatchHandle {
    watcher: Arc<Watcher>,
}

impl WatchHandle {
    /// Stop watching. Idempotent.
    pub fn unwatch(&self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }
}

/// Watch a source against a component and invoke `callback` when its
/// value changes.
pub fn watch<C>(
    owner: ComponentId,
    source: impl Into<WatchSource>,
    callback: C,
    options: WatchOptions,
) -> WatchHandle
where
    C: Fn(&Value, &Value) -> Result<(), Error> + Send + Sync + 'static,
{
    let callback: Callback = Arc::new(callback);
    let (getter, expression) = match source.into() {
        WatchSource::Path(path) => {
            let expression = path.clone();
            (path_getter(owner, path), expression)
        }
        WatchSource::Getter(getter) => (getter, "fn()".to_string()),
    };

    let watcher = Watcher::new(
        Some(owner),
        getter,
        Some(callback.clone()),
        expression,
        WatcherOptions {
            deep: options.deep,
            user: true,
            sync: options.sync,
            ..Default::default()
        },
    );

    if options.immediate {
        let info = format!("callback for immediate watcher \"{}\"", watcher.expression());
        let value = watcher.value();
        context::untracked(|| {
            error::invoke_callback(&callback, &value, &Value::Null, Some(owner), &info);
        });
    }

    WatchHandle { watcher }
}

/// A cached derived value; see [`computed`]. Clones share the cache.
#[derive(Clone)]
pub struct Computed {
    watcher: Arc<Watcher>,
}

impl Computed {
    /// Read the value, recomputing only if a dependency changed since the
    /// last read.
    ///
    /// When another watcher is evaluating, the computed's own deps attach
    /// to it as well, so invalidation propagates through derivation
    /// layers.
    pub fn get(&self) -> Value {
        if self.watcher.is_dirty() {
            self.watcher.evaluate();
        }
        if context::is_tracking() {
            self.watcher.depend();
        }
        self.watcher.value()
    }

    /// Stop tracking. Idempotent.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }
}

/// Create a lazy cached derivation owned by `owner`.
pub fn computed<F>(owner: ComponentId, getter: F) -> Computed
where
    F: Fn() -> Result<Value, Error> + Send + Sync + 'static,
{
    let watcher = Watcher::new(
        Some(owner),
        Arc::new(getter),
        None,
        "computed",
        WatcherOptions {
            lazy: true,
            ..Default::default()
        },
    );
    Computed { watcher }
}

/// Create a component's render watcher.
///
/// `render` runs immediately to produce the first tree and establish
/// dependencies, then re-runs through the scheduler whenever one of them
/// changes, at most once per flush.
pub fn create_render_watcher<F>(owner: ComponentId, render: F) -> Arc<Watcher>
where
    F: Fn() -> Result<(), Error> + Send + Sync + 'static,
{
    let getter: Getter = Arc::new(move || {
        render()?;
        Ok(Value::Null)
    });
    let watcher = Watcher::new(
        Some(owner),
        getter,
        None,
        "render",
        WatcherOptions {
            render: true,
            ..Default::default()
        },
    );
    component::set_render_watcher(owner, watcher.clone());
    watcher
}

/// Build a getter that resolves a dotted path against a component's data,
/// falling back to its injections for the first segment.
fn path_getter(owner: ComponentId, path: String) -> Getter {
    let Some(segments) = parse_path(&path) else {
        config::dev_warn(&format!(
            "failed watching path \"{path}\": only dot-delimited identifier paths are supported; \
             use a getter for anything else"
        ));
        return Arc::new(|| Ok(Value::Null));
    };

    Arc::new(move || {
        let Some(component) = component::get_component(owner) else {
            return Ok(Value::Null);
        };
        let first = &segments[0];
        let mut current = if component.data().contains_key_untracked(first) {
            component.data().get(first)
        } else {
            component.injected().get(first)
        };
        for segment in &segments[1..] {
            current = match current {
                Value::Object(obj) => obj.get(segment),
                _ => return Ok(Value::Null),
            };
        }
        Ok(current)
    })
}

fn parse_path(path: &str) -> Option<Vec<String>> {
    if path.is_empty() {
        return None;
    }
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '_' || c == '$');
    if !valid {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return None;
    }
    Some(segments)
}
