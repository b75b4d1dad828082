//! Lifecycle orchestration: drives the test tree depth-first, giving
//! every entity the same template — new record, start, pre-body, body,
//! post-body, stop — and funneling thrown errors into the record
//! through their classification.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::context::{bind_current_case, CaseContext};
use crate::errors::{SkipInfo, TestError};
use crate::observation::ObservationHub;
use crate::record::{CaseRun, RunRecord, SuiteRun};
use crate::tree::{Case, Suite, TestEntity};

/// Executes entities sequentially: at any time exactly one case body is
/// running. Asynchronous work belongs to the waiter subsystem; the
/// engine itself never spawns.
pub struct ExecutionEngine {
    hub: Rc<ObservationHub>,
}

impl ExecutionEngine {
    pub fn new(hub: Rc<ObservationHub>) -> Self {
        Self { hub }
    }

    pub fn run(&self, entity: &TestEntity) -> RunRecord {
        match entity {
            TestEntity::Case(case) => RunRecord::Case(self.run_case(case)),
            TestEntity::Suite(suite) => RunRecord::Suite(self.run_suite(suite)),
        }
    }

    fn run_suite(&self, suite: &Suite) -> SuiteRun {
        self.hub.suite_will_start(suite.name());
        let mut run = SuiteRun::new(suite.name());
        run.start();
        if let Some(hooks) = suite.class_hooks() {
            (hooks.set_up)();
        }
        for child in suite.children() {
            run.append(self.run(child));
        }
        if let Some(hooks) = suite.class_hooks() {
            (hooks.tear_down)();
        }
        run.stop();
        self.hub.suite_did_finish(&run);
        run
    }

    fn run_case(&self, case: &Case) -> CaseRun {
        let display_name = case.display_name();
        debug!(case = %display_name, "case starting");
        self.hub.case_will_start(&display_name);

        let record = Rc::new(RefCell::new(CaseRun::new(display_name.as_str())));
        record.borrow_mut().start();

        let context = Rc::new(CaseContext::new(
            display_name.as_str(),
            record.clone(),
            self.hub.clone(),
        ));
        {
            // The current-case slot is bound for the whole invocation so
            // assertions in set-up and tear-down route correctly.
            let _slot = bind_current_case(context.clone());
            let mut invocation = case.new_invocation();
            let mut outcome = BodyOutcome::default();

            if let Err(error) = invocation.set_up_checked() {
                outcome.absorb(&context, error);
            }
            invocation.set_up();

            if !outcome.skip_invocation {
                if let Err(error) = invocation.invoke() {
                    outcome.absorb(&context, error);
                }
            }

            for expectation in context.unwaited_expectations() {
                context.record_failure(
                    "Failed due to unwaited expectations",
                    Some(expectation.creation_location()),
                    true,
                );
            }

            if let Some(skip) = outcome.parked_skip.take() {
                context.record_skip(skip);
            }

            let mut teardown_blocks = context.take_teardown_blocks();
            while let Some(block) = teardown_blocks.pop() {
                block();
            }
            invocation.tear_down();
            if let Err(error) = invocation.tear_down_checked() {
                if error.classification().record_as_failure {
                    context.record_failure(thrown_description(&error), None, false);
                }
            }
        }

        record.borrow_mut().stop();
        let run = record.borrow().clone();
        self.hub.case_did_finish(&display_name, &run);
        debug!(
            case = %display_name,
            failures = run.total_failure_count(),
            skipped = run.has_been_skipped(),
            "case finished"
        );
        run
    }
}

/// What the pre-body and body phases decided: whether the body is
/// suppressed and whether a skip is parked for recording.
#[derive(Default)]
struct BodyOutcome {
    skip_invocation: bool,
    parked_skip: Option<SkipInfo>,
}

impl BodyOutcome {
    /// Classifies a thrown error and applies its effects.
    fn absorb(&mut self, context: &CaseContext, error: TestError) {
        let classification = error.classification();
        if classification.record_as_failure {
            context.record_failure(thrown_description(&error), None, false);
        }
        if classification.record_as_skip {
            if let TestError::Skip(info) = error {
                self.parked_skip.get_or_insert(info);
            }
        }
        if classification.skip_invocation {
            self.skip_invocation = true;
        }
    }
}

fn thrown_description(error: &TestError) -> String {
    format!("threw error \"{error}\"")
}
