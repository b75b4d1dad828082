//! The default textual progress observer.
//!
//! Failure, skip, and summary lines are canonical formats parsed by
//! tooling and are never colorized; pass/fail verdicts on finish lines
//! get ANSI color when stdout is a terminal.

use std::time::Duration;

use crate::errors::SkipInfo;
use crate::location::SourceLocation;
use crate::observation::TestObserver;
use crate::record::{CaseRun, RecordedFailure, SuiteRun};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";

/// Prints lifecycle progress to stdout.
pub struct ProgressReporter {
    use_colors: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(atty::is(atty::Stream::Stdout))
    }
}

impl ProgressReporter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn location_prefix(location: Option<SourceLocation>) -> String {
        match location {
            Some(location) => location.to_string(),
            None => "<unknown>:0".to_string(),
        }
    }
}

fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// The canonical run summary for a suite record.
fn summary_line(record: &SuiteRun) -> String {
    format!(
        "Executed {} test(s), with {} test(s) skipped and {} failure(s) ({} unexpected) \
         in {} ({}) seconds",
        record.execution_count(),
        record.skip_count(),
        record.total_failure_count(),
        record.unexpected_failure_count(),
        seconds(record.test_duration()),
        seconds(record.total_duration()),
    )
}

impl TestObserver for ProgressReporter {
    fn bundle_will_start(&self, bundle_name: &str) {
        println!("Test bundle '{bundle_name}' started");
    }

    fn bundle_did_finish(&self, record: &SuiteRun) {
        println!("{}", summary_line(record));
    }

    fn suite_will_start(&self, name: &str) {
        println!("Test Suite '{name}' started");
    }

    fn suite_did_finish(&self, record: &SuiteRun) {
        let verdict = if record.has_succeeded() {
            self.colorize("passed", GREEN)
        } else {
            self.colorize("failed", RED)
        };
        println!("Test Suite '{}' {verdict}", record.name());
        println!("\t {}", summary_line(record));
    }

    fn case_will_start(&self, display_name: &str) {
        println!("Test Case '{display_name}' started");
    }

    fn case_did_fail(&self, display_name: &str, failure: &RecordedFailure) {
        println!(
            "{}: error: {display_name} : {}",
            Self::location_prefix(failure.location),
            failure.description
        );
    }

    fn case_was_skipped(&self, display_name: &str, skip: &SkipInfo) {
        println!(
            "{}: {display_name} : {}",
            skip.location,
            skip.summary()
        );
    }

    fn case_did_finish(&self, display_name: &str, record: &CaseRun) {
        let verdict = if record.has_been_skipped() {
            self.colorize("skipped", YELLOW)
        } else if record.has_succeeded() {
            self.colorize("passed", GREEN)
        } else {
            self.colorize("failed", RED)
        };
        let duration = record.duration().unwrap_or(Duration::ZERO);
        println!(
            "Test Case '{display_name}' {verdict} ({} seconds)",
            seconds(duration)
        );
    }
}
