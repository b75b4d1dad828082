//! Per-entity result accumulators.
//!
//! A leaf case accumulates into a [`CaseRun`]; a suite owns a
//! [`SuiteRun`] whose counters are computed by summing its children.
//! Lifecycle misuse (starting twice, recording outside the start/stop
//! window) is a programming error and aborts.

use std::time::{Duration, Instant};

use crate::errors::SkipInfo;
use crate::location::SourceLocation;

/// One failure recorded against a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFailure {
    pub description: String,
    pub location: Option<SourceLocation>,
    /// True for assertion violations; false for errors thrown outside an
    /// assertion context.
    pub expected: bool,
}

/// Accumulator for a single case invocation.
#[derive(Debug, Clone)]
pub struct CaseRun {
    display_name: String,
    start_time: Option<Instant>,
    stop_time: Option<Instant>,
    execution_count: u32,
    failure_count: u32,
    unexpected_failure_count: u32,
    skip: Option<SkipInfo>,
    failures: Vec<RecordedFailure>,
}

impl CaseRun {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            start_time: None,
            stop_time: None,
            execution_count: 0,
            failure_count: 0,
            unexpected_failure_count: 0,
            skip: None,
            failures: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn start(&mut self) {
        assert!(
            self.start_time.is_none(),
            "result record for '{}' started twice",
            self.display_name
        );
        self.start_time = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        assert!(
            self.start_time.is_some(),
            "result record for '{}' stopped before it was started",
            self.display_name
        );
        assert!(
            self.stop_time.is_none(),
            "result record for '{}' stopped twice",
            self.display_name
        );
        self.stop_time = Some(Instant::now());
        self.execution_count += 1;
    }

    pub fn record_failure(
        &mut self,
        description: impl Into<String>,
        location: Option<SourceLocation>,
        expected: bool,
    ) {
        self.assert_running("record a failure");
        if expected {
            self.failure_count += 1;
        } else {
            self.unexpected_failure_count += 1;
        }
        self.failures.push(RecordedFailure {
            description: description.into(),
            location,
            expected,
        });
    }

    pub fn record_skip(&mut self, skip: SkipInfo) {
        self.assert_running("record a skip");
        assert!(
            self.skip.is_none(),
            "skip recorded twice on '{}'",
            self.display_name
        );
        self.skip = Some(skip);
    }

    fn assert_running(&self, action: &str) {
        assert!(
            self.start_time.is_some() && self.stop_time.is_none(),
            "attempted to {action} on '{}' outside its start/stop window",
            self.display_name
        );
    }

    pub fn has_started(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn has_stopped(&self) -> bool {
        self.stop_time.is_some()
    }

    /// Wall duration, defined only once both timestamps are present.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop.duration_since(start)),
            _ => None,
        }
    }

    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn unexpected_failure_count(&self) -> u32 {
        self.unexpected_failure_count
    }

    pub fn total_failure_count(&self) -> u32 {
        self.failure_count + self.unexpected_failure_count
    }

    pub fn skip_count(&self) -> u32 {
        u32::from(self.skip.is_some())
    }

    pub fn has_been_skipped(&self) -> bool {
        self.skip.is_some()
    }

    pub fn skip(&self) -> Option<&SkipInfo> {
        self.skip.as_ref()
    }

    pub fn failures(&self) -> &[RecordedFailure] {
        &self.failures
    }

    pub fn has_succeeded(&self) -> bool {
        self.has_stopped() && self.total_failure_count() == 0
    }
}

/// Accumulator for a suite: its own timing plus the ordered records of
/// its children. Every counter is a sum over the children.
#[derive(Debug, Clone)]
pub struct SuiteRun {
    name: String,
    start_time: Option<Instant>,
    stop_time: Option<Instant>,
    children: Vec<RunRecord>,
}

impl SuiteRun {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_time: None,
            stop_time: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&mut self) {
        assert!(
            self.start_time.is_none(),
            "suite record for '{}' started twice",
            self.name
        );
        self.start_time = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        assert!(
            self.start_time.is_some() && self.stop_time.is_none(),
            "suite record for '{}' stopped out of order",
            self.name
        );
        self.stop_time = Some(Instant::now());
    }

    pub fn append(&mut self, child: RunRecord) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[RunRecord] {
        &self.children
    }

    pub fn execution_count(&self) -> u32 {
        self.children.iter().map(RunRecord::execution_count).sum()
    }

    pub fn failure_count(&self) -> u32 {
        self.children.iter().map(RunRecord::failure_count).sum()
    }

    pub fn unexpected_failure_count(&self) -> u32 {
        self.children
            .iter()
            .map(RunRecord::unexpected_failure_count)
            .sum()
    }

    pub fn total_failure_count(&self) -> u32 {
        self.failure_count() + self.unexpected_failure_count()
    }

    pub fn skip_count(&self) -> u32 {
        self.children.iter().map(RunRecord::skip_count).sum()
    }

    /// Sum of the leaf cases' durations.
    pub fn test_duration(&self) -> Duration {
        self.children.iter().map(RunRecord::test_duration).sum()
    }

    /// Wall duration of the whole suite, zero until stopped.
    pub fn total_duration(&self) -> Duration {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn has_succeeded(&self) -> bool {
        self.stop_time.is_some() && self.total_failure_count() == 0
    }
}

/// A finished entity record: either one case or one suite.
#[derive(Debug, Clone)]
pub enum RunRecord {
    Case(CaseRun),
    Suite(SuiteRun),
}

impl RunRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::Case(run) => run.display_name(),
            Self::Suite(run) => run.name(),
        }
    }

    pub fn execution_count(&self) -> u32 {
        match self {
            Self::Case(run) => run.execution_count(),
            Self::Suite(run) => run.execution_count(),
        }
    }

    pub fn failure_count(&self) -> u32 {
        match self {
            Self::Case(run) => run.failure_count(),
            Self::Suite(run) => run.failure_count(),
        }
    }

    pub fn unexpected_failure_count(&self) -> u32 {
        match self {
            Self::Case(run) => run.unexpected_failure_count(),
            Self::Suite(run) => run.unexpected_failure_count(),
        }
    }

    pub fn total_failure_count(&self) -> u32 {
        self.failure_count() + self.unexpected_failure_count()
    }

    pub fn skip_count(&self) -> u32 {
        match self {
            Self::Case(run) => run.skip_count(),
            Self::Suite(run) => run.skip_count(),
        }
    }

    pub fn test_duration(&self) -> Duration {
        match self {
            Self::Case(run) => run.duration().unwrap_or(Duration::ZERO),
            Self::Suite(run) => run.test_duration(),
        }
    }

    /// All leaf case records, depth-first.
    pub fn leaf_cases(&self) -> Vec<&CaseRun> {
        match self {
            Self::Case(run) => vec![run],
            Self::Suite(run) => run
                .children()
                .iter()
                .flat_map(RunRecord::leaf_cases)
                .collect(),
        }
    }

    /// Finds a leaf case record by display name.
    pub fn find_case(&self, display_name: &str) -> Option<&CaseRun> {
        self.leaf_cases()
            .into_iter()
            .find(|run| run.display_name() == display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SkipInfo;
    use crate::here;

    fn started(name: &str) -> CaseRun {
        let mut run = CaseRun::new(name);
        run.start();
        run
    }

    #[test]
    fn lifecycle_counts_one_execution() {
        let mut run = started("A.t");
        assert_eq!(run.execution_count(), 0);
        run.stop();
        assert_eq!(run.execution_count(), 1);
        assert!(run.has_succeeded());
        assert!(run.duration().is_some());
    }

    #[test]
    fn failures_split_by_expectedness() {
        let mut run = started("A.t");
        run.record_failure("assertion", Some(here!()), true);
        run.record_failure("thrown", None, false);
        run.stop();
        assert_eq!(run.failure_count(), 1);
        assert_eq!(run.unexpected_failure_count(), 1);
        assert_eq!(run.total_failure_count(), 2);
        assert!(!run.has_succeeded());
        assert_eq!(run.failures().len(), 2);
    }

    #[test]
    fn skip_is_zero_or_one() {
        let mut run = started("A.t");
        run.record_skip(SkipInfo {
            message: Some("later".into()),
            location: here!(),
        });
        run.stop();
        assert_eq!(run.skip_count(), 1);
        assert!(run.has_been_skipped());
    }

    #[test]
    #[should_panic(expected = "started twice")]
    fn double_start_aborts() {
        let mut run = started("A.t");
        run.start();
    }

    #[test]
    #[should_panic(expected = "stopped before it was started")]
    fn stop_without_start_aborts() {
        let mut run = CaseRun::new("A.t");
        run.stop();
    }

    #[test]
    #[should_panic(expected = "outside its start/stop window")]
    fn failure_after_stop_aborts() {
        let mut run = started("A.t");
        run.stop();
        run.record_failure("late", None, true);
    }

    #[test]
    #[should_panic(expected = "skip recorded twice")]
    fn duplicate_skip_aborts() {
        let mut run = started("A.t");
        let skip = SkipInfo {
            message: None,
            location: here!(),
        };
        run.record_skip(skip.clone());
        run.record_skip(skip);
    }

    #[test]
    fn composite_sums_children() {
        let mut suite = SuiteRun::new("S");
        suite.start();

        let mut passing = started("A.pass");
        passing.stop();
        suite.append(RunRecord::Case(passing));

        let mut failing = started("A.fail");
        failing.record_failure("nope", Some(here!()), true);
        failing.stop();
        suite.append(RunRecord::Case(failing));

        suite.stop();
        assert_eq!(suite.execution_count(), 2);
        assert_eq!(suite.failure_count(), 1);
        assert_eq!(suite.unexpected_failure_count(), 0);
        assert_eq!(suite.total_failure_count(), 1);
        assert!(!suite.has_succeeded());

        let record = RunRecord::Suite(suite);
        assert_eq!(record.leaf_cases().len(), 2);
        assert!(record.find_case("A.fail").is_some());
        assert!(record.find_case("A.missing").is_none());
    }

    #[test]
    fn root_totals_equal_leaf_sums() {
        let mut inner = SuiteRun::new("inner");
        inner.start();
        let mut a = started("C.a");
        a.record_failure("x", None, false);
        a.stop();
        inner.append(RunRecord::Case(a));
        inner.stop();

        let mut root = SuiteRun::new("root");
        root.start();
        root.append(RunRecord::Suite(inner));
        root.stop();

        let record = RunRecord::Suite(root);
        let leaf_total: u32 = record
            .leaf_cases()
            .iter()
            .map(|c| c.total_failure_count())
            .sum();
        assert_eq!(record.total_failure_count(), leaf_total);
    }
}
