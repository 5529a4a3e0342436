//! Engine Configuration
//!
//! Process-wide knobs: the global error handler of last resort and a
//! `silent` switch that suppresses development warnings. Both default to
//! off; embedding runtimes set them once at startup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::component::ComponentId;
use crate::error::Error;

/// Handler of last resort for errors no capture hook claimed.
///
/// Receives the error, the component it surfaced from (if any), and a
/// short description of the invocation site.
pub type ErrorHandler = Arc<dyn Fn(&Error, Option<ComponentId>, &str) + Send + Sync>;

static ERROR_HANDLER: OnceLock<RwLock<Option<ErrorHandler>>> = OnceLock::new();
static SILENT: AtomicBool = AtomicBool::new(false);

fn error_handler_cell() -> &'static RwLock<Option<ErrorHandler>> {
    ERROR_HANDLER.get_or_init(|| RwLock::new(None))
}

/// Install the global error handler.
pub fn set_error_handler(handler: ErrorHandler) {
    *error_handler_cell().write() = Some(handler);
}

/// Remove the global error handler; unhandled errors fall back to the log.
pub fn clear_error_handler() {
    *error_handler_cell().write() = None;
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    error_handler_cell().read().clone()
}

/// Suppress development warnings.
pub fn set_silent(silent: bool) {
    SILENT.store(silent, Ordering::SeqCst);
}

pub fn is_silent() -> bool {
    SILENT.load(Ordering::SeqCst)
}

/// Emit a development diagnostic unless silenced.
pub(crate) fn dev_warn(message: &str) {
    if !is_silent() {
        tracing::warn!(target: "weft", "{message}");
    }
}
