//! The waiter half of the async subsystem: cooperative suspension until
//! a set of expectations resolves one way or another.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::context::with_current_case;
use crate::location::SourceLocation;

use super::expectation::{Expectation, ExpectationInner, ExpectationSnapshot};
use super::{manager, subsystem_lock};

/// Upper bound on a single suspension slice, so cancellation from
/// another thread is prompt even without an explicit wake.
pub const MAX_SUSPENSION_SLICE: Duration = Duration::from_millis(100);

// Serializes delegate callbacks. Never acquired while the subsystem
// queue is held.
static DELEGATE_QUEUE: Mutex<()> = Mutex::new(());

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Every non-inverted expectation was fulfilled (for inverted ones,
    /// the full timeout elapsed without a violation).
    Completed,
    /// The deadline passed with non-inverted expectations unfulfilled.
    TimedOut,
    /// Fulfillment order diverged from the waited order.
    IncorrectOrder,
    /// An inverted expectation was fulfilled.
    InvertedFulfillment,
    /// An enclosing waiter's timeout unwound this wait.
    Interrupted,
}

/// Out-of-band notifications about a waiter's resolution. Callbacks run
/// on the delegate serialization lock, never on the subsystem queue.
pub trait WaitDelegate: Send + Sync {
    fn did_time_out(&self, _waiter: &Waiter, _unfulfilled: &[Expectation]) {}
    fn did_violate_ordering(
        &self,
        _waiter: &Waiter,
        _fulfilled: &Expectation,
        _required: &Expectation,
    ) {
    }
    fn did_fulfill_inverted(&self, _waiter: &Waiter, _expectation: &Expectation) {}
    fn was_interrupted_by(&self, _waiter: &Waiter, _outer: &Waiter) {}
}

/// Blocks the calling thread until a set of expectations is satisfied,
/// times out, violates ordering, fulfills an inverted expectation, or
/// is interrupted. Single-use: a second `wait` is a programming error.
#[derive(Clone)]
pub struct Waiter {
    core: Arc<WaiterCore>,
}

pub(super) struct WaiterCore {
    // Guarded by the subsystem queue for every transition.
    state: Mutex<WaiterState>,
    primitive: Suspension,
    delegate: Mutex<Option<Arc<dyn WaitDelegate>>>,
    wait_location: Mutex<Option<SourceLocation>>,
}

enum WaiterState {
    Ready,
    Waiting(WaitingState),
    Finished(FinishedState),
}

struct WaitingState {
    enforce_order: bool,
    // Waiters observe expectations weakly; the owning case keeps them
    // alive for the duration of the wait.
    waited: Vec<Weak<ExpectationInner>>,
}

struct FinishedState {
    result: WaitResult,
    fulfilled: Vec<Expectation>,
    unfulfilled: Vec<Expectation>,
}

/// Resolution event computed under the queue, delivered after release.
enum Notice {
    Completed,
    TimedOut { unfulfilled: Vec<Expectation> },
    IncorrectOrder { fulfilled: Expectation, required: Expectation },
    Inverted { expectation: Expectation },
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            core: Arc::new(WaiterCore {
                state: Mutex::new(WaiterState::Ready),
                primitive: Suspension::new(),
                delegate: Mutex::new(None),
                wait_location: Mutex::new(None),
            }),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn WaitDelegate>) {
        *self.core.delegate.lock() = Some(delegate);
    }

    /// Blocks until the wait resolves. See [`WaitResult`] for the
    /// possible outcomes; duplicate expectations in the input are a
    /// programming error.
    pub fn wait(
        &self,
        expectations: &[&Expectation],
        timeout: Duration,
        enforce_order: bool,
        location: SourceLocation,
    ) -> WaitResult {
        for (i, a) in expectations.iter().enumerate() {
            for b in &expectations[i + 1..] {
                assert!(
                    !a.ptr_eq(b),
                    "API violation - expectation '{}' appears more than once in a wait",
                    a.description()
                );
            }
        }

        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600));
        *self.core.wait_location.lock() = Some(location);
        debug!(
            expectations = expectations.len(),
            timeout_secs = timeout.as_secs_f64(),
            enforce_order,
            "waiter entering wait"
        );

        let initial = {
            let _queue = subsystem_lock();
            {
                let mut state = self.core.state.lock();
                match &*state {
                    WaiterState::Ready => {}
                    _ => panic!("API violation - waiters may only be used once"),
                }
                *state = WaiterState::Waiting(WaitingState {
                    enforce_order,
                    waited: expectations.iter().map(|e| e.downgrade()).collect(),
                });
            }
            for expectation in expectations {
                let weak = Arc::downgrade(&self.core);
                expectation.queue_begin_wait(Arc::new(move || {
                    if let Some(core) = weak.upgrade() {
                        let notice = {
                            let _queue = subsystem_lock();
                            queue_validate(&core, false)
                        };
                        deliver(&core, notice);
                    }
                }));
            }
            queue_validate(&self.core, false)
        };
        deliver(&self.core, initial);

        manager::register(&self.core, deadline);

        loop {
            if self.core.is_finished() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                let notice = {
                    let _queue = subsystem_lock();
                    queue_validate(&self.core, true)
                };
                let timed_out = matches!(self.core.result(), Some(WaitResult::TimedOut));
                deliver(&self.core, notice);
                if timed_out {
                    manager::interrupt_waiters_started_after(&self.core);
                }
                break;
            }
            let remaining = deadline - now;
            self.core.primitive.park(remaining.min(MAX_SUSPENSION_SLICE));
        }

        manager::deregister(&self.core);

        // Scoped teardown: detach our handler from every observed
        // expectation and read the terminal result, on all exit paths.
        let result = {
            let _queue = subsystem_lock();
            let state = self.core.state.lock();
            match &*state {
                WaiterState::Finished(finished) => {
                    for expectation in finished.fulfilled.iter().chain(&finished.unfulfilled) {
                        expectation.queue_detach_handler();
                    }
                    finished.result
                }
                _ => unreachable!("wait loop exited without reaching a terminal state"),
            }
        };
        debug!(?result, "waiter finished");
        result
    }

    pub fn result(&self) -> Option<WaitResult> {
        self.core.result()
    }

    /// Expectations that were fulfilled when the wait finished, in
    /// fulfillment-token order. Empty before the wait resolves.
    pub fn fulfilled_expectations(&self) -> Vec<Expectation> {
        match &*self.core.state.lock() {
            WaiterState::Finished(finished) => finished.fulfilled.clone(),
            _ => Vec::new(),
        }
    }

    /// Expectations still unfulfilled when the wait finished, in waited
    /// order. Empty before the wait resolves.
    pub fn unfulfilled_expectations(&self) -> Vec<Expectation> {
        match &*self.core.state.lock() {
            WaiterState::Finished(finished) => finished.unfulfilled.clone(),
            _ => Vec::new(),
        }
    }

    pub fn wait_location(&self) -> Option<SourceLocation> {
        *self.core.wait_location.lock()
    }

    pub(super) fn from_core(core: Arc<WaiterCore>) -> Self {
        Self { core }
    }
}

impl WaiterCore {
    fn is_finished(&self) -> bool {
        matches!(&*self.state.lock(), WaiterState::Finished(_))
    }

    fn result(&self) -> Option<WaitResult> {
        match &*self.state.lock() {
            WaiterState::Finished(finished) => Some(finished.result),
            _ => None,
        }
    }
}

// ============================================================================
// Validation. Runs after every fulfillment and at timeout, always with
// the subsystem queue held.
// ============================================================================

fn queue_validate(core: &Arc<WaiterCore>, due_to_timeout: bool) -> Option<Notice> {
    let mut state = core.state.lock();
    let (enforce_order, waited) = match &*state {
        WaiterState::Waiting(waiting) => (waiting.enforce_order, waiting.waited.clone()),
        _ => return None,
    };

    let entries = snapshot_entries(&waited);

    if let Some((expectation, _)) = entries
        .iter()
        .find(|(_, snap)| snap.is_inverted && snap.is_fulfilled)
    {
        let notice = Notice::Inverted {
            expectation: expectation.clone(),
        };
        *state = finished_state(WaitResult::InvertedFulfillment, &entries);
        return Some(notice);
    }

    if enforce_order {
        // True fulfillment order is the token order, not notification
        // order; compare it pairwise against the waited order.
        let mut fulfilled: Vec<&(Expectation, ExpectationSnapshot)> = entries
            .iter()
            .filter(|(_, snap)| !snap.is_inverted && snap.is_fulfilled)
            .collect();
        fulfilled.sort_by_key(|(_, snap)| snap.fulfillment_token);
        let required: Vec<&(Expectation, ExpectationSnapshot)> = entries
            .iter()
            .filter(|(_, snap)| !snap.is_inverted)
            .collect();
        for (position, (actual, _)) in fulfilled.iter().enumerate() {
            let (expected, _) = required[position];
            if !actual.ptr_eq(expected) {
                let notice = Notice::IncorrectOrder {
                    fulfilled: actual.clone(),
                    required: expected.clone(),
                };
                *state = finished_state(WaitResult::IncorrectOrder, &entries);
                return Some(notice);
            }
        }
    }

    let has_inverted = entries.iter().any(|(_, snap)| snap.is_inverted);
    let all_non_inverted_fulfilled = entries
        .iter()
        .filter(|(_, snap)| !snap.is_inverted)
        .all(|(_, snap)| snap.is_fulfilled);

    // An inverted expectation keeps the wait open until its deadline; a
    // violation may still arrive.
    if all_non_inverted_fulfilled && !has_inverted {
        *state = finished_state(WaitResult::Completed, &entries);
        return Some(Notice::Completed);
    }

    if due_to_timeout {
        if all_non_inverted_fulfilled {
            *state = finished_state(WaitResult::Completed, &entries);
            return Some(Notice::Completed);
        }
        let unfulfilled: Vec<Expectation> = entries
            .iter()
            .filter(|(_, snap)| !snap.is_inverted && !snap.is_fulfilled)
            .map(|(e, _)| e.clone())
            .collect();
        *state = finished_state(WaitResult::TimedOut, &entries);
        return Some(Notice::TimedOut { unfulfilled });
    }

    trace!("waiter validation incomplete");
    None
}

fn snapshot_entries(
    waited: &[Weak<ExpectationInner>],
) -> Vec<(Expectation, ExpectationSnapshot)> {
    waited
        .iter()
        .filter_map(Weak::upgrade)
        .map(Expectation::from_inner)
        .map(|expectation| {
            let snapshot = expectation.queue_snapshot();
            (expectation, snapshot)
        })
        .collect()
}

fn finished_state(
    result: WaitResult,
    entries: &[(Expectation, ExpectationSnapshot)],
) -> WaiterState {
    let mut fulfilled: Vec<(u64, Expectation)> = entries
        .iter()
        .filter(|(_, snap)| snap.is_fulfilled)
        .map(|(e, snap)| (snap.fulfillment_token, e.clone()))
        .collect();
    fulfilled.sort_by_key(|(token, _)| *token);
    let unfulfilled: Vec<Expectation> = entries
        .iter()
        .filter(|(_, snap)| !snap.is_fulfilled)
        .map(|(e, _)| e.clone())
        .collect();
    WaiterState::Finished(FinishedState {
        result,
        fulfilled: fulfilled.into_iter().map(|(_, e)| e).collect(),
        unfulfilled,
    })
}

/// Wakes the suspended thread and notifies the delegate, with the
/// subsystem queue released.
fn deliver(core: &Arc<WaiterCore>, notice: Option<Notice>) {
    let Some(notice) = notice else { return };
    core.primitive.wake();
    let delegate = core.delegate.lock().clone();
    let Some(delegate) = delegate else { return };
    let waiter = Waiter::from_core(core.clone());
    let _serial = DELEGATE_QUEUE.lock();
    match notice {
        Notice::Completed => {}
        Notice::TimedOut { unfulfilled } => delegate.did_time_out(&waiter, &unfulfilled),
        Notice::IncorrectOrder {
            fulfilled,
            required,
        } => delegate.did_violate_ordering(&waiter, &fulfilled, &required),
        Notice::Inverted { expectation } => delegate.did_fulfill_inverted(&waiter, &expectation),
    }
}

/// Transitions a still-waiting waiter to `Interrupted`. Caller holds the
/// subsystem queue. Returns false when the waiter already finished.
pub(super) fn queue_interrupt(core: &Arc<WaiterCore>) -> bool {
    let mut state = core.state.lock();
    let waited = match &*state {
        WaiterState::Waiting(waiting) => waiting.waited.clone(),
        _ => return false,
    };
    let entries = snapshot_entries(&waited);
    *state = finished_state(WaitResult::Interrupted, &entries);
    true
}

/// Wakes an interrupted waiter and tells its delegate which enclosing
/// waiter unwound it. Caller must not hold the subsystem queue.
pub(super) fn notify_interrupted(core: &Arc<WaiterCore>, outer: &Arc<WaiterCore>) {
    core.primitive.wake();
    let delegate = core.delegate.lock().clone();
    let Some(delegate) = delegate else { return };
    let waiter = Waiter::from_core(core.clone());
    let outer = Waiter::from_core(outer.clone());
    let _serial = DELEGATE_QUEUE.lock();
    delegate.was_interrupted_by(&waiter, &outer);
}

// ============================================================================
// Suspension primitive: a per-waiter flag and condvar. Parks in bounded
// slices; an explicit wake is consumed by the next park.
// ============================================================================

struct Suspension {
    woken: Mutex<bool>,
    wakeup: Condvar,
}

impl Suspension {
    fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    fn park(&self, max_slice: Duration) {
        let mut woken = self.woken.lock();
        if !*woken {
            let _ = self.wakeup.wait_for(&mut woken, max_slice);
        }
        *woken = false;
    }

    fn wake(&self) {
        let mut woken = self.woken.lock();
        *woken = true;
        self.wakeup.notify_all();
    }
}

// ============================================================================
// Case-level wait: the default delegate behavior. A resolution other
// than `Completed` is recorded as a failure on the current case.
// ============================================================================

/// Waits on `expectations` and records any non-completed resolution as
/// an (expected) failure on the current case. Returns the raw result so
/// callers can still branch on it.
pub fn wait_on(
    expectations: &[&Expectation],
    timeout: Duration,
    enforce_order: bool,
    location: SourceLocation,
) -> WaitResult {
    let waiter = Waiter::new();
    let result = waiter.wait(expectations, timeout, enforce_order, location);
    let description = match result {
        WaitResult::Completed => None,
        WaitResult::TimedOut => {
            let unfulfilled: Vec<String> = waiter
                .unfulfilled_expectations()
                .iter()
                .map(Expectation::description)
                .collect();
            Some(format!(
                "Asynchronous wait failed - exceeded timeout of {} seconds, with \
                 unfulfilled expectations: {}",
                timeout.as_secs_f64(),
                unfulfilled.join(", ")
            ))
        }
        WaitResult::IncorrectOrder => {
            Some("Failed due to expectation fulfilled in incorrect order".to_string())
        }
        WaitResult::InvertedFulfillment => {
            let violated = waiter
                .fulfilled_expectations()
                .into_iter()
                .find(|e| e.is_inverted());
            Some(match violated {
                Some(e) => format!("Fulfilled inverted expectation '{}'", e.description()),
                None => "Fulfilled inverted expectation".to_string(),
            })
        }
        WaitResult::Interrupted => Some(
            "Asynchronous wait was interrupted by an enclosing waiter's timeout".to_string(),
        ),
    };
    if let Some(description) = description {
        let _ =
            with_current_case(|case| case.record_failure(description.clone(), Some(location), true));
    }
    result
}

/// Waits on a slice of expectations from within a test body, recording
/// any non-completed resolution as a failure on the current case.
///
/// `wait_for!(&[&e1, &e2], timeout)` waits unordered;
/// `wait_for!(&[&e1, &e2], timeout, ordered)` also enforces that
/// fulfillment order matches the listed order.
#[macro_export]
macro_rules! wait_for {
    ($expectations:expr, $timeout:expr) => {
        $crate::expectations::wait_on($expectations, $timeout, false, $crate::here!())
    };
    ($expectations:expr, $timeout:expr, ordered) => {
        $crate::expectations::wait_on($expectations, $timeout, true, $crate::here!())
    };
}
