//! Lifecycle observation fan-out.
//!
//! Observers receive synchronous callbacks as the engine walks the test
//! tree. The hub copies its observer list before each dispatch so an
//! observer may add or remove observers without corrupting iteration,
//! and a panicking observer never takes the run down with it.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::warn;

use crate::errors::SkipInfo;
use crate::record::{CaseRun, RecordedFailure, SuiteRun};

/// Receiver of lifecycle events. All methods have empty defaults so an
/// observer implements only what it cares about.
pub trait TestObserver {
    fn bundle_will_start(&self, _bundle_name: &str) {}
    fn bundle_did_finish(&self, _record: &SuiteRun) {}
    fn suite_will_start(&self, _name: &str) {}
    fn suite_did_finish(&self, _record: &SuiteRun) {}
    fn case_will_start(&self, _display_name: &str) {}
    fn case_did_fail(&self, _display_name: &str, _failure: &RecordedFailure) {}
    fn case_was_skipped(&self, _display_name: &str, _skip: &SkipInfo) {}
    fn case_did_finish(&self, _display_name: &str, _record: &CaseRun) {}
}

/// An identity set of observers with insertion-order dispatch.
#[derive(Default)]
pub struct ObservationHub {
    observers: RefCell<Vec<Rc<dyn TestObserver>>>,
}

impl ObservationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Rc<dyn TestObserver>) {
        let mut observers = self.observers.borrow_mut();
        if !observers.iter().any(|o| Rc::ptr_eq(o, &observer)) {
            observers.push(observer);
        }
    }

    pub fn remove(&self, observer: &Rc<dyn TestObserver>) {
        self.observers
            .borrow_mut()
            .retain(|o| !Rc::ptr_eq(o, observer));
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Dispatches one event to every observer. The list is copied first,
    /// and observer panics are swallowed after logging.
    fn broadcast(&self, event: impl Fn(&dyn TestObserver)) {
        let observers = self.observers.borrow().clone();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| event(&*observer))).is_err() {
                warn!("test observer panicked during dispatch");
            }
        }
    }

    pub(crate) fn bundle_will_start(&self, bundle_name: &str) {
        self.broadcast(|o| o.bundle_will_start(bundle_name));
    }

    pub(crate) fn bundle_did_finish(&self, record: &SuiteRun) {
        self.broadcast(|o| o.bundle_did_finish(record));
    }

    pub(crate) fn suite_will_start(&self, name: &str) {
        self.broadcast(|o| o.suite_will_start(name));
    }

    pub(crate) fn suite_did_finish(&self, record: &SuiteRun) {
        self.broadcast(|o| o.suite_did_finish(record));
    }

    pub(crate) fn case_will_start(&self, display_name: &str) {
        self.broadcast(|o| o.case_will_start(display_name));
    }

    pub(crate) fn case_did_fail(&self, display_name: &str, failure: &RecordedFailure) {
        self.broadcast(|o| o.case_did_fail(display_name, failure));
    }

    pub(crate) fn case_was_skipped(&self, display_name: &str, skip: &SkipInfo) {
        self.broadcast(|o| o.case_was_skipped(display_name, skip));
    }

    pub(crate) fn case_did_finish(&self, display_name: &str, record: &CaseRun) {
        self.broadcast(|o| o.case_did_finish(display_name, record));
    }
}
