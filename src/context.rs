//! The "current case" slot and per-case execution context.
//!
//! The engine binds a [`CaseContext`] into a thread-local slot for the
//! duration of each case, so assertion helpers, expectation creation,
//! and teardown registration can find the running case without argument
//! threading. The slot is scoped: it is set at case entry and restored
//! at exit, and never leaks across cases.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::errors::SkipInfo;
use crate::expectations::Expectation;
use crate::location::SourceLocation;
use crate::observation::ObservationHub;
use crate::record::{CaseRun, RecordedFailure};

thread_local! {
    static CURRENT_CASE: RefCell<Option<Rc<CaseContext>>> = const { RefCell::new(None) };
}

/// Everything the running case exposes to helpers: its result record,
/// the observation hub, owned expectations, and registered teardowns.
pub struct CaseContext {
    display_name: String,
    record: Rc<RefCell<CaseRun>>,
    hub: Rc<ObservationHub>,
    expectations: RefCell<Vec<Expectation>>,
    teardown_blocks: RefCell<Vec<Box<dyn FnOnce()>>>,
    continue_after_failure: Cell<bool>,
}

impl CaseContext {
    pub(crate) fn new(
        display_name: impl Into<String>,
        record: Rc<RefCell<CaseRun>>,
        hub: Rc<ObservationHub>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            record,
            hub,
            expectations: RefCell::new(Vec::new()),
            teardown_blocks: RefCell::new(Vec::new()),
            continue_after_failure: Cell::new(true),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Records a failure on the case's result record and notifies
    /// observers, in that order.
    pub fn record_failure(
        &self,
        description: impl Into<String>,
        location: Option<SourceLocation>,
        expected: bool,
    ) {
        let failure = RecordedFailure {
            description: description.into(),
            location,
            expected,
        };
        self.record
            .borrow_mut()
            .record_failure(failure.description.clone(), location, expected);
        self.hub.case_did_fail(&self.display_name, &failure);
    }

    pub(crate) fn record_skip(&self, skip: SkipInfo) {
        self.record.borrow_mut().record_skip(skip.clone());
        self.hub.case_was_skipped(&self.display_name, &skip);
    }

    pub(crate) fn adopt_expectation(&self, expectation: Expectation) {
        self.expectations.borrow_mut().push(expectation);
    }

    pub(crate) fn register_teardown(&self, block: Box<dyn FnOnce()>) {
        self.teardown_blocks.borrow_mut().push(block);
    }

    pub(crate) fn take_teardown_blocks(&self) -> Vec<Box<dyn FnOnce()>> {
        std::mem::take(&mut self.teardown_blocks.borrow_mut())
    }

    /// Expectations created by this case that no waiter ever observed.
    pub(crate) fn unwaited_expectations(&self) -> Vec<Expectation> {
        self.expectations
            .borrow()
            .iter()
            .filter(|e| !e.has_been_waited_on())
            .cloned()
            .collect()
    }

    pub fn continues_after_failure(&self) -> bool {
        self.continue_after_failure.get()
    }
}

/// Scoped binding of the current-case slot; restores the previous value
/// on drop so nested bindings (which the sequential engine never creates,
/// but tests may) unwind correctly.
pub(crate) struct CurrentCaseGuard {
    previous: Option<Rc<CaseContext>>,
}

impl Drop for CurrentCaseGuard {
    fn drop(&mut self) {
        CURRENT_CASE.with(|slot| {
            *slot.borrow_mut() = self.previous.take();
        });
    }
}

pub(crate) fn bind_current_case(context: Rc<CaseContext>) -> CurrentCaseGuard {
    CURRENT_CASE.with(|slot| {
        let previous = slot.borrow_mut().replace(context);
        CurrentCaseGuard { previous }
    })
}

/// Runs `f` against the current case, or returns `None` when no case is
/// active on this thread. Helpers use this to drop work silently outside
/// a test, per the assertion contract.
pub fn with_current_case<R>(f: impl FnOnce(&CaseContext) -> R) -> Option<R> {
    CURRENT_CASE.with(|slot| {
        let current = slot.borrow().clone();
        current.map(|context| f(&context))
    })
}

/// Creates an expectation and, when a case is active, hands it to the
/// case so unwaited expectations can be flagged at body end.
pub fn new_expectation(description: impl Into<String>, location: SourceLocation) -> Expectation {
    let expectation = Expectation::new(description, location);
    let _ = with_current_case(|case| case.adopt_expectation(expectation.clone()));
    expectation
}

/// Registers a teardown block on the running case. Blocks run after the
/// body, before `tear_down`, in reverse registration order.
///
/// Calling this with no case active is a programming error.
pub fn add_teardown_block(block: impl FnOnce() + 'static) {
    let registered =
        with_current_case(|case| case.register_teardown(Box::new(block))).is_some();
    assert!(
        registered,
        "add_teardown_block called with no test case running"
    );
}

/// Creates an [`Expectation`](crate::expectations::Expectation) owned by
/// the current case, capturing the creation site.
#[macro_export]
macro_rules! expectation {
    ($description:expr) => {
        $crate::context::new_expectation($description, $crate::here!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context(name: &str) -> Rc<CaseContext> {
        let record = Rc::new(RefCell::new(CaseRun::new(name)));
        record.borrow_mut().start();
        Rc::new(CaseContext::new(
            name,
            record,
            Rc::new(ObservationHub::new()),
        ))
    }

    #[test]
    fn slot_is_scoped_and_restored() {
        assert!(with_current_case(|_| ()).is_none());
        let outer = test_context("A.outer");
        let guard = bind_current_case(outer.clone());
        let seen = with_current_case(|c| c.display_name().to_string());
        assert_eq!(seen.as_deref(), Some("A.outer"));
        {
            let inner = test_context("A.inner");
            let _inner_guard = bind_current_case(inner);
            let seen = with_current_case(|c| c.display_name().to_string());
            assert_eq!(seen.as_deref(), Some("A.inner"));
        }
        let seen = with_current_case(|c| c.display_name().to_string());
        assert_eq!(seen.as_deref(), Some("A.outer"));
        drop(guard);
        assert!(with_current_case(|_| ()).is_none());
    }

    #[test]
    #[should_panic(expected = "no test case running")]
    fn teardown_outside_case_aborts() {
        add_teardown_block(|| {});
    }

    #[test]
    fn teardown_blocks_are_taken_once() {
        let context = test_context("A.t");
        let _guard = bind_current_case(context.clone());
        add_teardown_block(|| {});
        add_teardown_block(|| {});
        assert_eq!(context.take_teardown_blocks().len(), 2);
        assert_eq!(context.take_teardown_blocks().len(), 0);
    }
}
