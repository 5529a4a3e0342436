//! Weft Core
//!
//! This crate provides the reactive state engine for the weft UI runtime.
//! It implements:
//!
//! - Reactive conversion of dynamic value trees (objects, arrays)
//! - Automatic, precise dependency tracking between state and computations
//! - Watchers (render, computed, user) over one shared mechanism
//! - A deduplicating scheduler that batches re-execution per tick
//! - Provide/inject resolution along the component ownership chain
//!
//! The template compiler, virtual-tree differ and host adapters live in
//! sibling crates; their entire contract with this engine is "give me a
//! function to re-run when my dependencies change".
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic value substrate the engine instruments
//! - `observe`: observers, deps, reactive objects and arrays
//! - `watch`: watchers, the evaluation context, traversal, the scheduler
//! - `component`: the instance arena, provide/inject, lifecycle hooks
//! - `error` / `config`: the error channel and global knobs
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{create_component, watch, tick, ComponentOptions, WatchOptions};
//! use serde_json::json;
//!
//! let id = create_component(ComponentOptions::new().data(json!({"count": 0})));
//! let data = weft_core::get_component(id).unwrap().data().clone();
//!
//! let handle = watch(id, "count", |new, old| {
//!     println!("count: {old:?} -> {new:?}");
//!     Ok(())
//! }, WatchOptions::default());
//!
//! data.set("count", 1.into());
//! data.set("count", 2.into());
//! tick(); // one batched callback, observing only the final value
//! handle.unwatch();
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod observe;
pub mod value;
pub mod watch;

pub use component::inject::{InjectDefault, Injection, ProvideSource};
pub use component::{
    create_component, destroy_component, get_component, Component, ComponentId, ComponentOptions,
    ErrorCapturedHook, UpdatedHook,
};
pub use error::Error;
pub use observe::{del, observe, observe_shallow, set, Arr, Dep, Obj, Observer};
pub use value::Value;
pub use watch::{
    computed, create_render_watcher, has_pending, is_tracking, next_tick, tick, untracked, watch,
    Computed, WatchHandle, WatchOptions, WatchSource, Watcher, WatcherOptions,
};
