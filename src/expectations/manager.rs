//! The waiter manager: a process-wide stack of currently-blocked
//! waiters in wait-start order.
//!
//! The engine runs one case at a time, so every overlapping wait belongs
//! to the running case; a waiter started while another is still waiting
//! is nested inside it. When an outer waiter's deadline passes, the
//! waiters nested inside it are finished with `Interrupted` so the stack
//! unwinds promptly instead of each draining its own timeout.

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use super::subsystem_lock;
use super::waiter::{notify_interrupted, queue_interrupt, WaiterCore};

struct ActiveWaiter {
    core: Weak<WaiterCore>,
    deadline: Instant,
}

static ACTIVE_WAITERS: Mutex<Vec<ActiveWaiter>> = Mutex::new(Vec::new());

pub(super) fn register(core: &Arc<WaiterCore>, deadline: Instant) {
    ACTIVE_WAITERS.lock().push(ActiveWaiter {
        core: Arc::downgrade(core),
        deadline,
    });
}

pub(super) fn deregister(core: &Arc<WaiterCore>) {
    // Dead weak entries are dropped opportunistically here as well.
    ACTIVE_WAITERS
        .lock()
        .retain(|active| match active.core.upgrade() {
            Some(existing) => !Arc::ptr_eq(&existing, core),
            None => false,
        });
}

/// Interrupts every still-waiting waiter registered after `outer`.
/// Called by a waiter that just timed out, with no locks held.
pub(super) fn interrupt_waiters_started_after(outer: &Arc<WaiterCore>) {
    let nested: Vec<(Arc<WaiterCore>, Instant)> = {
        let stack = ACTIVE_WAITERS.lock();
        let Some(position) = stack.iter().position(|active| {
            active
                .core
                .upgrade()
                .is_some_and(|existing| Arc::ptr_eq(&existing, outer))
        }) else {
            return;
        };
        stack[position + 1..]
            .iter()
            .filter_map(|active| active.core.upgrade().map(|core| (core, active.deadline)))
            .collect()
    };

    for (inner, inner_deadline) in nested {
        let transitioned = {
            let _queue = subsystem_lock();
            queue_interrupt(&inner)
        };
        if transitioned {
            let forfeited = inner_deadline.saturating_duration_since(Instant::now());
            debug!(
                forfeited_secs = forfeited.as_secs_f64(),
                "nested waiter interrupted by enclosing waiter's timeout"
            );
            notify_interrupted(&inner, outer);
        }
    }
}
