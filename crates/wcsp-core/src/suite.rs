//! Suite orchestration
//!
//! Runs many cases concurrently, bounded by the [`ContextPool`]. Cases share
//! no mutable state: completion order is arbitrary and never affects a
//! verdict. Admission follows matrix order.

use crate::config::HarnessConfig;
use crate::host::ContextHost;
use crate::matrix::MatrixBuilder;
use crate::pool::{ContextPool, PoolStats};
use crate::report::{CaseReport, CaseReporter, SuiteReport};
use crate::runner::CaseRunner;
use crate::types::{LoaderKind, TestCase};
use chrono::Utc;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::Instrument;

/// Hand `report` to the reporter; a panicking reporter loses only that record
fn record_guarded(reporter: &dyn CaseReporter, report: &CaseReport) {
    let recorded = std::panic::catch_unwind(AssertUnwindSafe(|| reporter.record(report)));
    if recorded.is_err() {
        tracing::error!(case = %report.case_id, "Reporter panicked while recording");
    }
}

/// Runs case batches with bounded concurrency
#[derive(Clone)]
pub struct SuiteRunner {
    runner: Arc<CaseRunner>,
    pool: ContextPool,
    reporter: Arc<dyn CaseReporter>,
}

impl std::fmt::Debug for SuiteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("runner", &self.runner)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl SuiteRunner {
    /// Create new suite runner
    #[must_use]
    pub fn new(
        host: Arc<dyn ContextHost>,
        reporter: Arc<dyn CaseReporter>,
        config: &HarnessConfig,
    ) -> Self {
        Self {
            runner: Arc::new(CaseRunner::new(host, config)),
            pool: ContextPool::new(config.max_concurrent_contexts),
            reporter,
        }
    }

    /// Get pool statistics
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Run every case and collect the reports
    ///
    /// Each finished case is also handed to the reporter as it completes.
    pub async fn run_all(&self, loader_kind: LoaderKind, cases: Vec<TestCase>) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();
        tracing::info!(
            "Running {} {} cases, at most {} at a time",
            cases.len(),
            loader_kind,
            self.pool.max_size()
        );

        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::with_capacity(cases.len());
        let mut reports = Vec::with_capacity(cases.len());

        for case in cases {
            let permit = match self.pool.acquire(&case).await {
                Ok(permit) => permit,
                Err(err) => {
                    tracing::debug!(case = %case.id(), "Not admitted: {}", err);
                    let report = CaseReport::new(&case, None, Err(err.into()), None, 0);
                    record_guarded(self.reporter.as_ref(), &report);
                    reports.push(report);
                    continue;
                }
            };

            let span = tracing::info_span!(
                "csp_case",
                case = %case.id(),
                loader = %case.loader_kind(),
                label = %case.label(),
            );
            let runner = Arc::clone(&self.runner);
            let reporter = Arc::clone(&self.reporter);
            let task_case = case.clone();
            let abort = tasks.spawn(
                async move {
                    let report = runner.run(&task_case).await;
                    drop(permit);
                    record_guarded(reporter.as_ref(), &report);
                    report
                }
                .instrument(span),
            );
            in_flight.insert(abort.id(), case);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, report)) => {
                    in_flight.remove(&id);
                    reports.push(report);
                }
                Err(err) => {
                    let Some(case) = in_flight.remove(&err.id()) else {
                        tracing::error!("Unknown case task failed: {}", err);
                        continue;
                    };
                    tracing::error!(case = %case.id(), "Case task aborted: {}", err);
                    let report = CaseReport::aborted(&case, err.to_string());
                    record_guarded(self.reporter.as_ref(), &report);
                    reports.push(report);
                }
            }
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = SuiteReport::new(loader_kind, started_at, elapsed_ms, reports);
        tracing::info!(
            "Suite finished: {} passed, {} failed in {}ms",
            report.passed,
            report.failed,
            report.elapsed_ms
        );
        report
    }
}

/// Running suite; await [`SuiteHandle::wait`] for its report
#[derive(Debug)]
pub struct SuiteHandle {
    cases: Vec<TestCase>,
    pool: ContextPool,
    join: JoinHandle<SuiteReport>,
}

impl SuiteHandle {
    /// Cases registered for this run, in matrix order
    #[inline]
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Whether every case has finished
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the suite to finish
    ///
    /// # Errors
    /// The join error if the orchestrating task panicked or was aborted.
    pub async fn wait(self) -> Result<SuiteReport, JoinError> {
        self.join.await
    }

    /// Admit no further cases
    ///
    /// Cases already running finish normally; every case still waiting for a
    /// slot fails with a `pool` error and the suite completes.
    pub fn stop_admission(&self) {
        tracing::info!("Stopping admission of new cases");
        self.pool.close();
    }

    /// Abort the run; cases in flight are cancelled and their contexts closed in background
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Register every case for `loader_kind` and start running them
///
/// Returns as soon as registration is done; cases execute on the current
/// tokio runtime and report through `reporter` as they finish.
///
/// # Panics
/// When called outside a tokio runtime.
pub fn run_content_security_policy_tests(
    loader_kind: LoaderKind,
    host: Arc<dyn ContextHost>,
    reporter: Arc<dyn CaseReporter>,
    config: &HarnessConfig,
) -> SuiteHandle {
    let cases = MatrixBuilder::new(config.host_info.clone()).build(loader_kind);
    for case in &cases {
        reporter.register(case);
    }

    let suite = SuiteRunner::new(host, reporter, config);
    let pool = suite.pool.clone();
    let batch = cases.clone();
    let join = tokio::spawn(async move { suite.run_all(loader_kind, batch).await });

    SuiteHandle { cases, pool, join }
}
