//! Asynchronous expectations and waiters.
//!
//! An [`Expectation`] is a named promise that some event will occur a
//! configurable number of times; a [`Waiter`] blocks the calling thread
//! until a set of expectations is satisfied, times out, violates an
//! ordering constraint, fulfills an inverted expectation, or is
//! interrupted by an enclosing waiter's timeout.
//!
//! All mutable expectation and waiter state is serialized on one
//! process-wide lock, the subsystem queue. Operations that require the
//! queue to be held are named `queue_*`. Fulfillment handlers and
//! delegate callbacks always run after the queue is released; delegates
//! are additionally serialized on their own lock so they can never
//! re-enter the subsystem queue from under it.

mod expectation;
mod manager;
mod waiter;

pub use expectation::Expectation;
pub use waiter::{wait_on, WaitDelegate, WaitResult, Waiter, MAX_SUSPENSION_SLICE};

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

// The subsystem queue. Lock order: subsystem queue, then any per-object
// state mutex; never the reverse.
static SUBSYSTEM_QUEUE: Mutex<()> = Mutex::new(());

pub(crate) fn subsystem_lock() -> MutexGuard<'static, ()> {
    SUBSYSTEM_QUEUE.lock()
}

// Two independent monotonic counters: creation tokens order expectation
// construction process-wide; fulfillment tokens stamp the moment each
// expectation became fulfilled. Both start at 1 so 0 can mean "never".
static CREATION_TOKENS: AtomicU64 = AtomicU64::new(1);
static FULFILLMENT_TOKENS: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_creation_token() -> u64 {
    CREATION_TOKENS.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn next_fulfillment_token() -> u64 {
    FULFILLMENT_TOKENS.fetch_add(1, Ordering::Relaxed)
}
