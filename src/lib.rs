//! attest: a unit-testing framework runtime.
//!
//! Test classes implement [`TestClass`], register their methods through
//! [`Registration`], and hand the result to [`cli::run`]. The engine
//! builds a hierarchical Case/Suite tree, executes each case with
//! set-up/tear-down semantics, and records structured outcomes.
//! Asynchronous tests block on [`expectations`](crate::expectations)
//! until fulfilled or timed out.

pub mod assertions;
pub mod cli;
pub mod context;
pub mod engine;
pub mod errors;
pub mod expectations;
pub mod location;
pub mod observation;
pub mod record;
pub mod registry;
pub mod reporter;
pub mod tree;

pub use context::{add_teardown_block, new_expectation, with_current_case};
pub use errors::{ErrorClassification, SkipInfo, TestError};
pub use expectations::{WaitDelegate, WaitResult, Waiter};
pub use location::SourceLocation;
pub use observation::{ObservationHub, TestObserver};
pub use record::{CaseRun, RecordedFailure, RunRecord, SuiteRun};
pub use registry::{Registration, Selector, TestClass, TestFilter, TestMethod};

/// The expectation type, re-exported at the root for test bodies.
pub use expectations::Expectation;
