//! The expectation half of the async subsystem.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::context::with_current_case;
use crate::location::SourceLocation;

use super::{next_creation_token, next_fulfillment_token, subsystem_lock};

pub(crate) type FulfillHandler = Arc<dyn Fn() + Send + Sync>;

/// A named promise that some event will occur.
///
/// Handles are cheaply cloneable and shareable across threads; `fulfill`
/// may be called from any thread. Configuration is rejected once a
/// waiter has observed the expectation.
#[derive(Clone)]
pub struct Expectation {
    inner: Arc<ExpectationInner>,
}

pub(crate) struct ExpectationInner {
    creation_token: u64,
    creation_location: SourceLocation,
    // Guarded by the subsystem queue for every mutation; the state mutex
    // alone only covers single-field reads.
    state: Mutex<ExpectationState>,
}

pub(crate) struct ExpectationState {
    description: String,
    expected_fulfillment_count: u32,
    fulfillment_count: u32,
    is_inverted: bool,
    assert_for_over_fulfill: bool,
    has_been_waited_on: bool,
    is_fulfilled: bool,
    fulfillment_token: u64,
    fulfillment_location: Option<SourceLocation>,
    on_fulfill: Option<FulfillHandler>,
}

enum FulfillOutcome {
    Plain,
    RunHandler(FulfillHandler),
    OverFulfill { description: String },
}

impl Expectation {
    pub fn new(description: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            inner: Arc::new(ExpectationInner {
                creation_token: next_creation_token(),
                creation_location: location,
                state: Mutex::new(ExpectationState {
                    description: description.into(),
                    expected_fulfillment_count: 1,
                    fulfillment_count: 0,
                    is_inverted: false,
                    assert_for_over_fulfill: false,
                    has_been_waited_on: false,
                    is_fulfilled: false,
                    fulfillment_token: 0,
                    fulfillment_location: None,
                    on_fulfill: None,
                }),
            }),
        }
    }

    /// Records one fulfillment without a source location.
    pub fn fulfill(&self) {
        self.fulfill_internal(None);
    }

    /// Records one fulfillment, noting where it happened.
    pub fn fulfill_at(&self, location: SourceLocation) {
        self.fulfill_internal(Some(location));
    }

    fn fulfill_internal(&self, location: Option<SourceLocation>) {
        let outcome = {
            let _queue = subsystem_lock();
            let mut state = self.inner.state.lock();
            if state.is_fulfilled && state.assert_for_over_fulfill {
                FulfillOutcome::OverFulfill {
                    description: state.description.clone(),
                }
            } else {
                state.fulfillment_count += 1;
                if !state.is_fulfilled
                    && state.fulfillment_count >= state.expected_fulfillment_count
                {
                    state.is_fulfilled = true;
                    state.fulfillment_token = next_fulfillment_token();
                    state.fulfillment_location = location;
                    trace!(
                        description = %state.description,
                        token = state.fulfillment_token,
                        "expectation fulfilled"
                    );
                    match state.on_fulfill.clone() {
                        Some(handler) => FulfillOutcome::RunHandler(handler),
                        None => FulfillOutcome::Plain,
                    }
                } else {
                    FulfillOutcome::Plain
                }
            }
        };

        // Both arms run with the queue released: the handler re-enters the
        // subsystem, and failure routing touches the current case.
        match outcome {
            FulfillOutcome::Plain => {}
            FulfillOutcome::RunHandler(handler) => handler(),
            FulfillOutcome::OverFulfill { description } => {
                let _ = with_current_case(|case| {
                    case.record_failure(
                        format!(
                            "API violation - multiple calls made to fulfill() for \
                             expectation '{description}'"
                        ),
                        location.or(Some(self.inner.creation_location)),
                        true,
                    );
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Configuration. Rejected once a waiter has observed the expectation.
    // ------------------------------------------------------------------

    pub fn set_expected_fulfillment_count(&self, count: u32) {
        assert!(count > 0, "expected fulfillment count must be positive");
        self.configure(|state| state.expected_fulfillment_count = count);
    }

    pub fn set_inverted(&self, inverted: bool) {
        self.configure(|state| state.is_inverted = inverted);
    }

    pub fn set_assert_for_over_fulfill(&self, assert_for_over_fulfill: bool) {
        self.configure(|state| state.assert_for_over_fulfill = assert_for_over_fulfill);
    }

    pub fn set_description(&self, description: impl Into<String>) {
        let description = description.into();
        self.configure(move |state| state.description = description);
    }

    fn configure(&self, mutate: impl FnOnce(&mut ExpectationState)) {
        let _queue = subsystem_lock();
        let mut state = self.inner.state.lock();
        assert!(
            !state.has_been_waited_on,
            "API violation - expectation '{}' configured after it was waited on",
            state.description
        );
        mutate(&mut state);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn description(&self) -> String {
        self.inner.state.lock().description.clone()
    }

    pub fn creation_token(&self) -> u64 {
        self.inner.creation_token
    }

    pub fn creation_location(&self) -> SourceLocation {
        self.inner.creation_location
    }

    pub fn is_fulfilled(&self) -> bool {
        self.inner.state.lock().is_fulfilled
    }

    pub fn fulfillment_count(&self) -> u32 {
        self.inner.state.lock().fulfillment_count
    }

    pub fn expected_fulfillment_count(&self) -> u32 {
        self.inner.state.lock().expected_fulfillment_count
    }

    /// Zero until fulfilled; afterwards the process-wide stamp of the
    /// moment this expectation flipped to fulfilled.
    pub fn fulfillment_token(&self) -> u64 {
        self.inner.state.lock().fulfillment_token
    }

    pub fn fulfillment_location(&self) -> Option<SourceLocation> {
        self.inner.state.lock().fulfillment_location
    }

    pub fn is_inverted(&self) -> bool {
        self.inner.state.lock().is_inverted
    }

    pub fn has_been_waited_on(&self) -> bool {
        self.inner.state.lock().has_been_waited_on
    }

    pub fn ptr_eq(&self, other: &Expectation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Waiter-side access. Callers hold the subsystem queue.
    // ------------------------------------------------------------------

    pub(crate) fn queue_begin_wait(&self, handler: FulfillHandler) {
        let mut state = self.inner.state.lock();
        state.has_been_waited_on = true;
        state.on_fulfill = Some(handler);
    }

    pub(crate) fn queue_detach_handler(&self) {
        self.inner.state.lock().on_fulfill = None;
    }

    pub(crate) fn queue_snapshot(&self) -> ExpectationSnapshot {
        let state = self.inner.state.lock();
        ExpectationSnapshot {
            is_fulfilled: state.is_fulfilled,
            is_inverted: state.is_inverted,
            fulfillment_token: state.fulfillment_token,
        }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ExpectationInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ExpectationInner>) -> Self {
        Self { inner }
    }
}

/// Point-in-time view of the fields waiter validation cares about.
pub(crate) struct ExpectationSnapshot {
    pub is_fulfilled: bool,
    pub is_inverted: bool,
    pub fulfillment_token: u64,
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Expectation")
            .field("description", &state.description)
            .field("is_fulfilled", &state.is_fulfilled)
            .field("fulfillment_count", &state.fulfillment_count)
            .field("is_inverted", &state.is_inverted)
            .finish()
    }
}
