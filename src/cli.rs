//! Driver entry point: argument surface, test listing, execution, and
//! exit-code translation.
//!
//! A test target's `main` hands its [`Registration`] to [`run`], which
//! never returns. [`execute`] is the non-exiting form used by library
//! callers and the test suite.

use std::process;
use std::rc::Rc;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::engine::ExecutionEngine;
use crate::errors::{print_error, UsageError};
use crate::observation::{ObservationHub, TestObserver};
use crate::record::RunRecord;
use crate::registry::{build_root_suite, Registration, TestFilter};
use crate::reporter::ProgressReporter;
use crate::tree::{Suite, TestEntity};

/// The argument surface of a test target binary.
#[derive(Debug, Parser)]
#[command(
    name = "attest",
    about = "Runs the tests registered with this target.",
    version
)]
pub struct HarnessArgs {
    /// Test selectors: `ClassName` runs a whole class,
    /// `ClassName/methodName` a single method. No selectors runs all.
    pub selectors: Vec<String>,

    /// Print the test tree, one `ClassName.methodName` line per case,
    /// and exit.
    #[arg(long, conflicts_with = "list_json")]
    pub list: bool,

    /// Print the test tree as JSON and exit.
    #[arg(long = "list-json")]
    pub list_json: bool,
}

/// Parses the process argument vector, runs or lists tests, and exits:
/// zero iff no test recorded a failure.
pub fn run(registration: Registration) -> ! {
    let args = HarnessArgs::parse();
    let filter = TestFilter::from_selectors(&args.selectors);

    if args.list || args.list_json {
        let root = build_root_suite(&registration, &filter);
        let rendered = if args.list_json {
            render_json_listing(&root)
        } else {
            Ok(render_human_listing(&root))
        };
        match rendered {
            Ok(text) => {
                println!("{text}");
                process::exit(0);
            }
            Err(error) => {
                print_error(error);
                process::exit(1);
            }
        }
    }

    let reporter: Rc<dyn TestObserver> = Rc::new(ProgressReporter::default());
    let record = execute(&registration, &filter, vec![reporter]);
    process::exit(i32::from(record.total_failure_count() != 0));
}

/// Builds the root suite, installs observers, and executes the tree.
pub fn execute(
    registration: &Registration,
    filter: &TestFilter,
    observers: Vec<Rc<dyn TestObserver>>,
) -> RunRecord {
    let hub = Rc::new(ObservationHub::new());
    for observer in observers {
        hub.add(observer);
    }

    let root = TestEntity::Suite(build_root_suite(registration, filter));
    hub.bundle_will_start(registration.bundle_name());
    let engine = ExecutionEngine::new(hub.clone());
    let record = engine.run(&root);
    if let RunRecord::Suite(root_run) = &record {
        hub.bundle_did_finish(root_run);
    }
    record
}

// ============================================================================
// Listing
// ============================================================================

/// One node of the JSON listing tree; leaves carry no `tests` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<ListingNode>>,
}

impl ListingNode {
    pub fn from_entity(entity: &TestEntity) -> ListingNode {
        match entity {
            TestEntity::Case(case) => ListingNode {
                name: case.display_name(),
                tests: None,
            },
            TestEntity::Suite(suite) => ListingNode {
                name: suite.name().to_string(),
                tests: Some(
                    suite
                        .children()
                        .iter()
                        .map(ListingNode::from_entity)
                        .collect(),
                ),
            },
        }
    }

    /// Leaf names in tree order.
    pub fn leaf_names(&self) -> Vec<String> {
        match &self.tests {
            None => vec![self.name.clone()],
            Some(children) => children.iter().flat_map(ListingNode::leaf_names).collect(),
        }
    }
}

/// One `ClassName.methodName` line per leaf case.
pub fn render_human_listing(root: &Suite) -> String {
    let mut lines = Vec::new();
    for child in root.children() {
        lines.extend(child.leaf_names());
    }
    lines.join("\n")
}

pub fn render_json_listing(root: &Suite) -> Result<String, UsageError> {
    let node = ListingNode {
        name: root.name().to_string(),
        tests: Some(
            root.children()
                .iter()
                .map(ListingNode::from_entity)
                .collect(),
        ),
    };
    serde_json::to_string_pretty(&node).map_err(UsageError::ListingRender)
}
