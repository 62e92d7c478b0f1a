//! Case and suite reports
//!
//! The assertion/reporting framework is external: it implements
//! [`CaseReporter`] and receives one registration per generated case and
//! one record per finished case. [`TracingReporter`] logs verdicts.

use crate::error::HarnessError;
use crate::types::{CaseId, LoaderKind, OutcomeKind, TestCase};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// Verdict of one case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
}

/// Why a case failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseFailure {
    /// Stable error identifier, e.g. `exchange_timeout`
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Typed error, when the failure came from the harness
    #[serde(skip)]
    pub error: Option<HarnessError>,
}

impl CaseFailure {
    #[must_use]
    pub fn from_error(error: HarnessError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            error: Some(error),
        }
    }

    /// Failure without a harness error, e.g. a panicked case task
    #[must_use]
    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            kind: "aborted".to_string(),
            message: message.into(),
            error: None,
        }
    }
}

/// Result of running one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    pub case_id: CaseId,
    pub label: String,
    pub loader_kind: LoaderKind,
    pub window_url: String,
    pub script_url: String,
    pub expected: OutcomeKind,
    /// Outcome the context reported, if it reported a valid one
    pub observed: Option<OutcomeKind>,
    pub status: CaseStatus,
    pub failure: Option<CaseFailure>,
    /// Teardown problem, recorded beside the verdict and never replacing it
    pub teardown_error: Option<String>,
    pub elapsed_ms: u64,
}

impl CaseReport {
    /// Build a report from the runner's observations
    #[must_use]
    pub fn new(
        case: &TestCase,
        observed: Option<OutcomeKind>,
        result: Result<(), HarnessError>,
        teardown_error: Option<String>,
        elapsed_ms: u64,
    ) -> Self {
        let (status, failure) = match result {
            Ok(()) => (CaseStatus::Passed, None),
            Err(error) => (CaseStatus::Failed, Some(CaseFailure::from_error(error))),
        };
        Self {
            case_id: case.id(),
            label: case.label().to_string(),
            loader_kind: case.loader_kind(),
            window_url: case.window_url().to_string(),
            script_url: case.script_url().to_string(),
            expected: case.expected_outcome(),
            observed,
            status,
            failure,
            teardown_error,
            elapsed_ms,
        }
    }

    /// Failed report for a case whose task never produced one
    #[must_use]
    pub fn aborted(case: &TestCase, reason: impl Into<String>) -> Self {
        Self {
            status: CaseStatus::Failed,
            failure: Some(CaseFailure::aborted(reason)),
            ..Self::new(case, None, Ok(()), None, 0)
        }
    }

    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }

    /// Typed error behind a failure
    #[must_use]
    pub fn error(&self) -> Option<&HarnessError> {
        self.failure.as_ref().and_then(|f| f.error.as_ref())
    }
}

/// Receives structured case results
pub trait CaseReporter: Send + Sync {
    /// A case was generated and will run
    fn register(&self, case: &TestCase);

    /// A case finished
    fn record(&self, report: &CaseReport);
}

/// Reporter that logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl CaseReporter for TracingReporter {
    fn register(&self, case: &TestCase) {
        tracing::debug!(case = %case.id(), "Registered: {}", case.label());
    }

    fn record(&self, report: &CaseReport) {
        match &report.failure {
            None => tracing::info!(case = %report.case_id, "PASS {}", report.label),
            Some(failure) => tracing::error!(
                case = %report.case_id,
                kind = %failure.kind,
                "FAIL {}: {}",
                report.label,
                failure.message
            ),
        }
        if let Some(teardown) = &report.teardown_error {
            tracing::warn!(case = %report.case_id, "Teardown problem: {}", teardown);
        }
    }
}

/// Results of a whole suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub loader_kind: LoaderKind,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failures before the exchange started
    pub launch_failures: usize,
    /// Failures caused by a launch or exchange deadline
    pub timeouts: usize,
    /// Ordered by case ID regardless of completion order
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    /// Assemble from case reports in any order
    #[must_use]
    pub fn new(
        loader_kind: LoaderKind,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        mut cases: Vec<CaseReport>,
    ) -> Self {
        cases.sort_by_key(|c| c.case_id);
        let passed = cases.iter().filter(|c| c.passed()).count();
        let count_errors = |pred: fn(&HarnessError) -> bool| {
            cases.iter().filter(|c| c.error().is_some_and(pred)).count()
        };
        let launch_failures = count_errors(HarnessError::is_launch_failure);
        let timeouts = count_errors(HarnessError::is_timeout);
        Self {
            loader_kind,
            started_at,
            elapsed_ms,
            total: cases.len(),
            passed,
            failed: cases.len() - passed,
            launch_failures,
            timeouts,
            cases,
        }
    }

    /// Whether every case passed
    #[inline]
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Failed cases in case ID order
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.passed())
    }

    /// Plain-text summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Worklet CSP Conformance Report ({})", self.loader_kind);
        let _ = writeln!(out, "========================================");
        let _ = writeln!(out, "Started: {}", self.started_at.to_rfc3339());
        let _ = writeln!(out, "Elapsed: {}ms", self.elapsed_ms);
        let _ = writeln!(out);
        for case in &self.cases {
            let mark = if case.passed() { "PASS" } else { "FAIL" };
            let _ = writeln!(out, "  [{mark}] {} {}", case.case_id, case.label);
        }
        if !self.all_passed() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Failures:");
            for case in self.failures() {
                if let Some(failure) = &case.failure {
                    let _ = writeln!(
                        out,
                        "  {} {}: {}",
                        case.case_id, failure.kind, failure.message
                    );
                }
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        let _ = writeln!(
            out,
            "Launch failures: {}  Timeouts: {}",
            self.launch_failures, self.timeouts
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixBuilder;

    #[test]
    fn failed_report_keeps_expected_and_observed() {
        let case = &MatrixBuilder::default().build(LoaderKind::Paint)[0];
        let report = CaseReport::new(
            case,
            Some(OutcomeKind::Resolved),
            Err(HarnessError::OutcomeMismatch {
                expected: OutcomeKind::Rejected,
                observed: OutcomeKind::Resolved,
            }),
            None,
            3,
        );

        assert!(!report.passed());
        assert_eq!(report.expected, OutcomeKind::Rejected);
        assert_eq!(report.observed, Some(OutcomeKind::Resolved));
        assert_eq!(report.failure.as_ref().unwrap().kind, "outcome_mismatch");
    }

    #[test]
    fn suite_report_sorts_and_counts() {
        let cases = MatrixBuilder::default().build(LoaderKind::Paint);
        let reports = vec![
            CaseReport::new(&cases[2], Some(OutcomeKind::Rejected), Ok(()), None, 1),
            CaseReport::aborted(&cases[0], "panicked"),
            CaseReport::new(&cases[1], Some(OutcomeKind::Rejected), Ok(()), None, 1),
        ];

        let suite = SuiteReport::new(LoaderKind::Paint, Utc::now(), 5, reports);
        assert_eq!(suite.total, 3);
        assert_eq!(suite.passed, 2);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.cases[0].case_id, CaseId(0));
        assert!(!suite.all_passed());
        assert!(suite.generate_text().contains("[FAIL] case-00"));
    }

    #[test]
    fn text_lists_failures_with_their_kind() {
        let cases = MatrixBuilder::default().build(LoaderKind::Audio);
        let reports = vec![
            CaseReport::new(&cases[0], Some(OutcomeKind::Rejected), Ok(()), None, 1),
            CaseReport::new(
                &cases[1],
                None,
                Err(HarnessError::LaunchTimeout {
                    url: cases[1].window_url().to_string(),
                    waited_ms: 50,
                }),
                None,
                50,
            ),
            CaseReport::new(
                &cases[2],
                None,
                Err(HarnessError::ExchangeTimeout { waited_ms: 50 }),
                None,
                60,
            ),
        ];

        let suite = SuiteReport::new(LoaderKind::Audio, Utc::now(), 60, reports);
        let failed: Vec<_> = suite.failures().map(|c| c.case_id).collect();
        assert_eq!(failed, vec![CaseId(1), CaseId(2)]);
        assert_eq!(suite.launch_failures, 1);
        assert_eq!(suite.timeouts, 2);

        let text = suite.generate_text();
        let section = text.split("Failures:").nth(1).unwrap();
        assert!(section.contains("case-01 launch_timeout"));
        assert!(section.contains("case-02 exchange_timeout"));
        assert!(!section.contains("case-00"));
        assert!(text.contains("Launch failures: 1  Timeouts: 2"));
    }

    #[test]
    fn passing_suite_has_no_failure_section() {
        let cases = MatrixBuilder::default().build(LoaderKind::Audio);
        let reports = vec![CaseReport::new(
            &cases[0],
            Some(OutcomeKind::Rejected),
            Ok(()),
            None,
            1,
        )];
        let suite = SuiteReport::new(LoaderKind::Audio, Utc::now(), 1, reports);

        assert_eq!(suite.failures().count(), 0);
        assert!(!suite.generate_text().contains("Failures:"));
    }

    #[test]
    fn report_serializes_outcomes_as_literals() {
        let case = &MatrixBuilder::default().build(LoaderKind::Paint)[0];
        let report = CaseReport::new(case, Some(OutcomeKind::Rejected), Ok(()), None, 0);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["expected"], "REJECTED");
        assert_eq!(value["status"], "passed");
        assert_eq!(value["loader_kind"], "paint");
    }
}
