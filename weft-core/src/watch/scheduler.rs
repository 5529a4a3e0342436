//! Update Scheduler
//!
//! The scheduler batches watcher re-execution. Ten synchronous mutations
//! notify ten times, but a watcher subscribed to all ten properties runs
//! once, at the next tick, observing only the final state.
//!
//! # How a Flush Works
//!
//! 1. The first watcher queued while idle schedules a flush on the tick
//!    queue; further enqueues of the same watcher are no-ops (the pending
//!    set is keyed by watcher id).
//!
//! 2. The flush sorts the queue ascending by creation id. Parents are
//!    created before children and computed sources before their readers,
//!    so this runs parents before children and producers before
//!    consumers.
//!
//! 3. Watchers queued *during* the flush (a side effect mutated state that
//!    invalidates another watcher) are spliced into the same pass at their
//!    sorted position past the cursor. A flush in progress is never
//!    restarted and a second flush never starts concurrently.
//!
//! 4. A watcher that keeps re-queuing itself is abandoned after
//!    [`MAX_UPDATE_COUNT`] re-entries with a cyclic-update diagnostic;
//!    the rest of the flush proceeds.
//!
//! 5. After the queue drains, owners of render watchers that ran receive
//!    their `updated` hook, and the scheduler resets to idle.
//!
//! # Tick Boundary
//!
//! There is no event loop in this crate. [`next_tick`] defers a callback
//! and [`tick`], called by the embedding loop once per turn, drains
//! deferred callbacks until none remain. That boundary is the engine's
//! only suspension point.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::watcher::Watcher;
use crate::component;
use crate::error::{self, Error};

/// Bound on re-entries of a single watcher within one flush before its
/// update chain is abandoned as cyclic.
pub const MAX_UPDATE_COUNT: usize = 100;

#[derive(Default)]
struct SchedulerState {
    /// Pending watchers; sorted by id once a flush begins.
    queue: Vec<Arc<Watcher>>,
    /// Ids currently pending, for O(1) dedup.
    has: HashSet<u64>,
    /// Re-entry counts per watcher within the current flush.
    circular: HashMap<u64, usize>,
    /// A flush has been scheduled on the tick queue.
    waiting: bool,
    /// A flush is running right now.
    flushing: bool,
    /// Cursor into `queue` during a flush.
    index: usize,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static TICK_CALLBACKS: RefCell<Vec<Box<dyn FnOnce()>>> = RefCell::new(Vec::new());
}

/// Defer a callback to the next tick.
pub fn next_tick<F: FnOnce() + 'static>(callback: F) {
    TICK_CALLBACKS.with(|callbacks| callbacks.borrow_mut().push(Box::new(callback)));
}

/// Drain deferred callbacks until none remain.
///
/// The embedding event loop calls this once per turn; it is where pending
/// flushes actually run. Callbacks deferred from inside a draining
/// callback run in the same call.
pub fn tick() {
    loop {
        let callbacks: Vec<Box<dyn FnOnce()>> =
            TICK_CALLBACKS.with(|callbacks| callbacks.borrow_mut().drain(..).collect());
        if callbacks.is_empty() {
            break;
        }
        for callback in callbacks {
            callback();
        }
    }
}

/// Whether any tick callbacks or pending watchers are outstanding.
pub fn has_pending() -> bool {
    TICK_CALLBACKS.with(|callbacks| !callbacks.borrow().is_empty())
        || SCHEDULER.with(|state| !state.borrow().queue.is_empty())
}

/// Queue a watcher for the next flush.
///
/// Already-pending watchers are skipped. During a flush the watcher is
/// inserted at its sorted position past the cursor, joining the current
/// pass; otherwise it is appended and a flush is scheduled if none is.
pub(crate) fn queue_watcher(watcher: Arc<Watcher>) {
    let id = watcher.id();
    let schedule_flush = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if state.has.contains(&id) {
            return false;
        }
        state.has.insert(id);

        if !state.flushing {
            state.queue.push(watcher);
        } else {
            let mut position = state.queue.len();
            while position > state.index + 1 && state.queue[position - 1].id() > id {
                position -= 1;
            }
            state.queue.insert(position, watcher);
        }

        if !state.waiting {
            state.waiting = true;
            true
        } else {
            false
        }
    });

    if schedule_flush {
        next_tick(flush_queue);
    }
}

/// Run the pending queue to completion.
fn flush_queue() {
    SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.index = 0;
        state.queue.sort_by_key(|watcher| watcher.id());
    });

    loop {
        // Pull the next watcher without holding the scheduler borrow while
        // it runs: running mutates state and may re-enter the queue.
        let next = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if state.index < state.queue.len() {
                let watcher = state.queue[state.index].clone();
                // Cleared before the run so a self-invalidating watcher
                // can re-queue into this same flush.
                state.has.remove(&watcher.id());
                Some(watcher)
            } else {
                None
            }
        });
        let Some(watcher) = next else { break };

        watcher.run();

        let cycle_detected = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&watcher.id()) {
                return false;
            }
            let count = state.circular.entry(watcher.id()).or_insert(0);
            *count += 1;
            if *count <= MAX_UPDATE_COUNT {
                return false;
            }
            // Abandon only this watcher's chain: drop its re-queued
            // entry and let the rest of the flush proceed.
            state.has.remove(&watcher.id());
            let cursor = state.index;
            if let Some(offset) = state
                .queue
                .iter()
                .skip(cursor + 1)
                .position(|pending| pending.id() == watcher.id())
            {
                state.queue.remove(cursor + 1 + offset);
            }
            true
        });

        if cycle_detected {
            let err = Error::CyclicUpdate(watcher.expression().to_string());
            error::handle_error(&err, watcher.owner(), "scheduler flush");
        }

        SCHEDULER.with(|state| state.borrow_mut().index += 1);
    }

    let ran: Vec<Arc<Watcher>> = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        let ran = std::mem::take(&mut state.queue);
        state.has.clear();
        state.circular.clear();
        state.waiting = false;
        state.flushing = false;
        state.index = 0;
        ran
    });

    call_updated_hooks(&ran);
}

/// Deliver the `updated` lifecycle hook to owners of render watchers that
/// ran in this flush, children first.
fn call_updated_hooks(ran: &[Arc<Watcher>]) {
    for watcher in ran.iter().rev() {
        if watcher.is_render() && watcher.is_active() {
            if let Some(owner) = watcher.owner() {
                component::call_updated_hook(owner);
            }
        }
    }
}
