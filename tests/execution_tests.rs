//! End-to-end lifecycle scenarios driven through the public driver API.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use attest::cli::execute;
use attest::{
    add_teardown_block, check, check_eq, skip, CaseRun, Registration, RunRecord, SkipInfo,
    TestClass, TestError, TestFilter, TestObserver,
};

/// Collects observer events as `"<kind> <case>"` strings.
#[derive(Default)]
struct RecordingObserver {
    events: RefCell<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn push(&self, kind: &str, name: &str) {
        self.events.borrow_mut().push(format!("{kind} {name}"));
    }
}

impl TestObserver for RecordingObserver {
    fn case_will_start(&self, display_name: &str) {
        self.push("start", display_name);
    }

    fn case_did_fail(&self, display_name: &str, _failure: &attest::RecordedFailure) {
        self.push("fail", display_name);
    }

    fn case_was_skipped(&self, display_name: &str, _skip: &SkipInfo) {
        self.push("skip", display_name);
    }

    fn case_did_finish(&self, display_name: &str, _record: &CaseRun) {
        self.push("finish", display_name);
    }
}

fn run_with_observer(
    registration: Registration,
    filter: TestFilter,
) -> (RunRecord, Rc<RecordingObserver>) {
    let observer = Rc::new(RecordingObserver::default());
    let record = execute(&registration, &filter, vec![observer.clone()]);
    (record, observer)
}

// ============================================================================
// Scenario: a selector runs exactly one method.
// ============================================================================

static SELECTED_T2_RAN: AtomicBool = AtomicBool::new(false);

struct SelectorTarget;

impl TestClass for SelectorTarget {
    fn class_name() -> &'static str {
        "SelectorTarget"
    }
    fn new() -> Self {
        SelectorTarget
    }
}

impl SelectorTarget {
    fn t1(&mut self) -> Result<(), TestError> {
        Ok(())
    }

    fn t2(&mut self) -> Result<(), TestError> {
        SELECTED_T2_RAN.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn selector_runs_one_method() {
    let registration = Registration::new("bundle")
        .class::<SelectorTarget>(&[("t1", SelectorTarget::t1), ("t2", SelectorTarget::t2)]);
    let filter = TestFilter::from_selectors(&["SelectorTarget/t1".to_string()]);
    let (record, observer) = run_with_observer(registration, filter);

    assert_eq!(record.execution_count(), 1);
    assert_eq!(record.total_failure_count(), 0);
    assert!(!SELECTED_T2_RAN.load(Ordering::SeqCst), "t2 must never run");

    let events = observer.events();
    assert!(events.contains(&"start SelectorTarget.t1".to_string()));
    assert!(events.contains(&"finish SelectorTarget.t1".to_string()));
    assert!(!events.iter().any(|e| e.contains("SelectorTarget.t2")));
}

// ============================================================================
// Scenario: a failing assertion.
// ============================================================================

struct FailingAssertion;

impl TestClass for FailingAssertion {
    fn class_name() -> &'static str {
        "FailingAssertion"
    }
    fn new() -> Self {
        FailingAssertion
    }
}

impl FailingAssertion {
    fn test_mismatch(&mut self) -> Result<(), TestError> {
        check_eq!(1, 2);
        Ok(())
    }
}

#[test]
fn failing_assertion_is_an_expected_failure() {
    let registration = Registration::new("bundle")
        .class::<FailingAssertion>(&[("test_mismatch", FailingAssertion::test_mismatch)]);
    let (record, observer) = run_with_observer(registration, TestFilter::All);

    assert_ne!(record.total_failure_count(), 0);
    let case = record.find_case("FailingAssertion.test_mismatch").unwrap();
    assert_eq!(case.failure_count(), 1);
    assert_eq!(case.unexpected_failure_count(), 0);
    let failure = &case.failures()[0];
    assert!(failure
        .description
        .contains("(\"1\") is not equal to (\"2\")"));
    assert!(failure.expected);
    assert!(failure.location.is_some());

    // Strict per-case event ordering: start, failures, finish.
    let events = observer.events();
    assert_eq!(
        events,
        vec![
            "start FailingAssertion.test_mismatch",
            "fail FailingAssertion.test_mismatch",
            "finish FailingAssertion.test_mismatch",
        ]
    );
}

// ============================================================================
// Scenario: a thrown error in the body.
// ============================================================================

#[derive(Debug)]
#[allow(dead_code)]
struct MyError(&'static str);

struct ThrowingBody;

impl TestClass for ThrowingBody {
    fn class_name() -> &'static str {
        "ThrowingBody"
    }
    fn new() -> Self {
        ThrowingBody
    }
}

impl ThrowingBody {
    fn test_boom(&mut self) -> Result<(), TestError> {
        Err(TestError::from_error(MyError("boom")))
    }
}

#[test]
fn thrown_error_is_an_unexpected_failure() {
    let registration =
        Registration::new("bundle").class::<ThrowingBody>(&[("test_boom", ThrowingBody::test_boom)]);
    let (record, _) = run_with_observer(registration, TestFilter::All);

    let case = record.find_case("ThrowingBody.test_boom").unwrap();
    assert_eq!(case.unexpected_failure_count(), 1);
    assert_eq!(case.failure_count(), 0);
    assert_eq!(
        case.failures()[0].description,
        "threw error \"MyError(\"boom\")\""
    );
}

// ============================================================================
// Scenario: skip raised in set-up.
// ============================================================================

static SKIPPED_BODY_RAN: AtomicBool = AtomicBool::new(false);
static SKIPPED_TEARDOWN_RAN: AtomicBool = AtomicBool::new(false);

struct SkipsInSetUp;

impl TestClass for SkipsInSetUp {
    fn class_name() -> &'static str {
        "SkipsInSetUp"
    }
    fn new() -> Self {
        SkipsInSetUp
    }

    fn set_up_checked(&mut self) -> Result<(), TestError> {
        skip!("needs net");
    }

    fn tear_down(&mut self) {
        SKIPPED_TEARDOWN_RAN.store(true, Ordering::SeqCst);
    }
}

impl SkipsInSetUp {
    fn test_network(&mut self) -> Result<(), TestError> {
        SKIPPED_BODY_RAN.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn skip_in_set_up_suppresses_body_but_not_teardown() {
    let registration = Registration::new("bundle")
        .class::<SkipsInSetUp>(&[("test_network", SkipsInSetUp::test_network)]);
    let (record, observer) = run_with_observer(registration, TestFilter::All);

    let case = record.find_case("SkipsInSetUp.test_network").unwrap();
    assert_eq!(case.skip_count(), 1);
    assert_eq!(case.total_failure_count(), 0);
    assert_eq!(case.execution_count(), 1);
    assert_eq!(case.skip().unwrap().summary(), "Test skipped - needs net");
    assert!(!SKIPPED_BODY_RAN.load(Ordering::SeqCst));
    assert!(SKIPPED_TEARDOWN_RAN.load(Ordering::SeqCst));
    assert!(observer
        .events()
        .contains(&"skip SkipsInSetUp.test_network".to_string()));
}

// ============================================================================
// Scenario: an ordinary error in set-up suppresses the body and is
// recorded as an unexpected failure; teardown still runs.
// ============================================================================

static ERRORED_BODY_RAN: AtomicBool = AtomicBool::new(false);
static ERRORED_TEARDOWN_RAN: AtomicBool = AtomicBool::new(false);

struct ErrorsInSetUp;

impl TestClass for ErrorsInSetUp {
    fn class_name() -> &'static str {
        "ErrorsInSetUp"
    }
    fn new() -> Self {
        ErrorsInSetUp
    }

    fn set_up_checked(&mut self) -> Result<(), TestError> {
        Err(TestError::raised("fixture exploded"))
    }

    fn tear_down(&mut self) {
        ERRORED_TEARDOWN_RAN.store(true, Ordering::SeqCst);
    }
}

impl ErrorsInSetUp {
    fn test_anything(&mut self) -> Result<(), TestError> {
        ERRORED_BODY_RAN.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn set_up_error_skips_body_and_records_failure() {
    let registration = Registration::new("bundle")
        .class::<ErrorsInSetUp>(&[("test_anything", ErrorsInSetUp::test_anything)]);
    let (record, _) = run_with_observer(registration, TestFilter::All);

    let case = record.find_case("ErrorsInSetUp.test_anything").unwrap();
    assert_eq!(case.unexpected_failure_count(), 1);
    assert_eq!(case.skip_count(), 0);
    assert!(case.failures()[0]
        .description
        .contains("threw error \"fixture exploded\""));
    assert!(!ERRORED_BODY_RAN.load(Ordering::SeqCst));
    assert!(ERRORED_TEARDOWN_RAN.load(Ordering::SeqCst));
}

// ============================================================================
// Teardown sequencing: blocks reversed, then tear_down, then
// tear_down_checked.
// ============================================================================

static TEARDOWN_TRACE: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

struct TeardownOrder;

impl TestClass for TeardownOrder {
    fn class_name() -> &'static str {
        "TeardownOrder"
    }
    fn new() -> Self {
        TeardownOrder
    }

    fn tear_down(&mut self) {
        TEARDOWN_TRACE.lock().push("tear_down");
    }

    fn tear_down_checked(&mut self) -> Result<(), TestError> {
        TEARDOWN_TRACE.lock().push("tear_down_checked");
        Ok(())
    }
}

impl TeardownOrder {
    fn test_registers_blocks(&mut self) -> Result<(), TestError> {
        add_teardown_block(|| TEARDOWN_TRACE.lock().push("block-1"));
        add_teardown_block(|| TEARDOWN_TRACE.lock().push("block-2"));
        add_teardown_block(|| TEARDOWN_TRACE.lock().push("block-3"));
        Ok(())
    }
}

#[test]
fn teardown_blocks_run_in_reverse_before_tear_down() {
    let registration = Registration::new("bundle")
        .class::<TeardownOrder>(&[("test_registers_blocks", TeardownOrder::test_registers_blocks)]);
    let (record, _) = run_with_observer(registration, TestFilter::All);
    assert_eq!(record.total_failure_count(), 0);

    let trace = TEARDOWN_TRACE.lock().clone();
    assert_eq!(
        trace,
        vec!["block-3", "block-2", "block-1", "tear_down", "tear_down_checked"]
    );
}

// ============================================================================
// Teardown still runs after a failing body, and its own thrown error is
// recorded as a failure.
// ============================================================================

static FAILING_TEARDOWN_RAN: AtomicBool = AtomicBool::new(false);

struct FailsEverywhere;

impl TestClass for FailsEverywhere {
    fn class_name() -> &'static str {
        "FailsEverywhere"
    }
    fn new() -> Self {
        FailsEverywhere
    }

    fn tear_down(&mut self) {
        FAILING_TEARDOWN_RAN.store(true, Ordering::SeqCst);
    }

    fn tear_down_checked(&mut self) -> Result<(), TestError> {
        Err(TestError::raised("teardown exploded"))
    }
}

impl FailsEverywhere {
    fn test_fails(&mut self) -> Result<(), TestError> {
        check!(false);
        Ok(())
    }
}

#[test]
fn teardown_runs_after_failure_and_its_error_is_recorded() {
    let registration = Registration::new("bundle")
        .class::<FailsEverywhere>(&[("test_fails", FailsEverywhere::test_fails)]);
    let (record, _) = run_with_observer(registration, TestFilter::All);

    let case = record.find_case("FailsEverywhere.test_fails").unwrap();
    assert!(FAILING_TEARDOWN_RAN.load(Ordering::SeqCst));
    assert_eq!(case.failure_count(), 1);
    assert_eq!(case.unexpected_failure_count(), 1);
    assert!(case.failures()[1]
        .description
        .contains("threw error \"teardown exploded\""));
}

// ============================================================================
// Class-level hooks run exactly once per class, regardless of how many
// methods were selected.
// ============================================================================

static CLASS_SET_UPS: AtomicUsize = AtomicUsize::new(0);
static CLASS_TEAR_DOWNS: AtomicUsize = AtomicUsize::new(0);

struct HookedClass;

impl TestClass for HookedClass {
    fn class_name() -> &'static str {
        "HookedClass"
    }
    fn new() -> Self {
        HookedClass
    }

    fn set_up_class() {
        CLASS_SET_UPS.fetch_add(1, Ordering::SeqCst);
    }

    fn tear_down_class() {
        CLASS_TEAR_DOWNS.fetch_add(1, Ordering::SeqCst);
    }
}

impl HookedClass {
    fn t1(&mut self) -> Result<(), TestError> {
        assert_eq!(CLASS_SET_UPS.load(Ordering::SeqCst), 1);
        Ok(())
    }

    fn t2(&mut self) -> Result<(), TestError> {
        assert_eq!(CLASS_TEAR_DOWNS.load(Ordering::SeqCst), 0);
        Ok(())
    }
}

#[test]
fn class_hooks_run_once_per_class() {
    let registration = Registration::new("bundle")
        .class::<HookedClass>(&[("t1", HookedClass::t1), ("t2", HookedClass::t2)]);
    let (record, _) = run_with_observer(registration, TestFilter::All);

    assert_eq!(record.execution_count(), 2);
    assert_eq!(record.total_failure_count(), 0);
    assert_eq!(CLASS_SET_UPS.load(Ordering::SeqCst), 1);
    assert_eq!(CLASS_TEAR_DOWNS.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Root totals and per-case execution counts.
// ============================================================================

struct MixedOutcomes;

impl TestClass for MixedOutcomes {
    fn class_name() -> &'static str {
        "MixedOutcomes"
    }
    fn new() -> Self {
        MixedOutcomes
    }
}

impl MixedOutcomes {
    fn passes(&mut self) -> Result<(), TestError> {
        Ok(())
    }

    fn fails(&mut self) -> Result<(), TestError> {
        check_eq!("left", "right");
        Ok(())
    }

    fn throws(&mut self) -> Result<(), TestError> {
        Err(TestError::raised("kaput"))
    }
}

#[test]
fn root_totals_are_leaf_sums_and_cases_execute_once() {
    let registration = Registration::new("bundle").class::<MixedOutcomes>(&[
        ("passes", MixedOutcomes::passes),
        ("fails", MixedOutcomes::fails),
        ("throws", MixedOutcomes::throws),
    ]);
    let (record, _) = run_with_observer(registration, TestFilter::All);

    let leaves = record.leaf_cases();
    assert_eq!(leaves.len(), 3);
    for leaf in &leaves {
        assert_eq!(leaf.execution_count(), 1);
    }
    let leaf_total: u32 = leaves.iter().map(|c| c.total_failure_count()).sum();
    assert_eq!(record.total_failure_count(), leaf_total);
    assert_eq!(record.failure_count(), 1);
    assert_eq!(record.unexpected_failure_count(), 1);
}

// ============================================================================
// Unwaited expectations fail the case at their creation site.
// ============================================================================

struct ForgetsToWait;

impl TestClass for ForgetsToWait {
    fn class_name() -> &'static str {
        "ForgetsToWait"
    }
    fn new() -> Self {
        ForgetsToWait
    }
}

impl ForgetsToWait {
    fn test_leaks_expectation(&mut self) -> Result<(), TestError> {
        let _forgotten = attest::expectation!("never awaited");
        Ok(())
    }
}

#[test]
fn unwaited_expectation_records_a_failure() {
    let registration = Registration::new("bundle").class::<ForgetsToWait>(&[(
        "test_leaks_expectation",
        ForgetsToWait::test_leaks_expectation,
    )]);
    let (record, _) = run_with_observer(registration, TestFilter::All);

    let case = record.find_case("ForgetsToWait.test_leaks_expectation").unwrap();
    assert_eq!(case.failure_count(), 1);
    let failure = &case.failures()[0];
    assert_eq!(failure.description, "Failed due to unwaited expectations");
    assert!(failure.location.unwrap().file.ends_with("execution_tests.rs"));
}
