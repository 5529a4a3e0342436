//! Error Channel
//!
//! User code runs inside the engine in three places: watcher getters,
//! watch callbacks, and lifecycle hooks. All three are fallible, and a
//! failure never unwinds through the engine. It is caught at the
//! invocation site and routed through [`handle_error`]:
//!
//! 1. Walk the ownership chain upward from the failing component, offering
//!    each ancestor's error-capture hooks the error. A hook returning
//!    `true` marks it handled and stops the walk.
//! 2. Otherwise, the global handler registered in [`crate::config`].
//! 3. Otherwise, a `tracing::error!` log.
//!
//! Dependency tracking is disabled while hooks run, so a hook that reads
//! reactive state cannot subscribe whatever watcher happened to be
//! evaluating when the error surfaced.

use thiserror::Error as ThisError;

use crate::component::{self, ComponentId};
use crate::config;
use crate::value::Value;
use crate::watch::context;
use crate::watch::watcher::Callback;

/// An error surfaced from user code running inside the engine.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// A watcher getter failed during evaluation.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A watch callback or lifecycle hook failed.
    #[error("callback failed: {0}")]
    Callback(String),

    /// A watcher re-queued itself past the scheduler's re-entry bound.
    /// The update chain was abandoned for the current flush.
    #[error("possible infinite update loop in watcher \"{0}\"")]
    CyclicUpdate(String),
}

/// Route an error from `owner` through capture hooks, the global handler,
/// and finally the log.
pub fn handle_error(err: &Error, owner: Option<ComponentId>, info: &str) {
    let _guard = context::push_target(None);

    if let Some(source) = owner {
        let mut current = component::get_component(source).and_then(|c| c.parent());
        while let Some(ancestor_id) = current {
            let Some(ancestor) = component::get_component(ancestor_id) else {
                break;
            };
            for hook in ancestor.error_captured_hooks() {
                if hook(err, source, info) {
                    return;
                }
            }
            current = ancestor.parent();
        }
    }

    global_handle_error(err, owner, info);
}

fn global_handle_error(err: &Error, owner: Option<ComponentId>, info: &str) {
    if let Some(handler) = config::error_handler() {
        handler(err, owner, info);
        return;
    }
    tracing::error!(target: "weft", ?owner, info, "unhandled error: {err}");
}

/// Invoke a watch callback, routing a failure through [`handle_error`].
pub(crate) fn invoke_callback(
    cb: &Callback,
    value: &Value,
    old: &Value,
    owner: Option<ComponentId>,
    info: &str,
) {
    if let Err(err) = cb(value, old) {
        handle_error(&err, owner, info);
    }
}
