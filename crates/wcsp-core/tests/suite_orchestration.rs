//! End-to-end suite runs against the simulated host

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::time::Duration;
use wcsp_core::simulator::{ReadyBehavior, ReplyBehavior, SimulatorBehavior};
use wcsp_core::{
    run_content_security_policy_tests, CaseId, CaseStatus, HarnessConfig, HarnessError,
    LoaderKind, ScriptCategory, SuiteRunner, CASES_PER_LOADER,
};
use wcsp_test_utils::{
    paint_cases, quick_config, setup_faulty_host, setup_simulated_host, RecordingReporter,
};

fn verdicts(report: &wcsp_core::SuiteReport) -> BTreeMap<CaseId, CaseStatus> {
    report.cases.iter().map(|c| (c.case_id, c.status)).collect()
}

#[tokio::test]
async fn entry_point_registers_before_running() {
    let config = quick_config();
    let host = setup_simulated_host(&config);
    let reporter = RecordingReporter::new();

    let handle = run_content_security_policy_tests(
        LoaderKind::Paint,
        host.clone(),
        reporter.clone(),
        &config,
    );

    // Nothing has run yet on this single-threaded runtime
    assert_eq!(reporter.registered().len(), CASES_PER_LOADER);
    assert_eq!(reporter.record_count(), 0);
    assert_eq!(handle.cases(), reporter.registered().as_slice());

    let report = handle.wait().await.unwrap();
    assert!(report.all_passed(), "{}", report.generate_text());
    assert_eq!(report.launch_failures, 0);
    assert_eq!(reporter.record_count(), CASES_PER_LOADER);
    assert!(host.stats().all_closed_exactly_once());
    assert_eq!(host.stats().opened, CASES_PER_LOADER);

    // Records arrive in completion order; the suite report is in case order
    let mut recorded: Vec<CaseId> = reporter.records().iter().map(|r| r.case_id).collect();
    recorded.sort();
    let reported: Vec<CaseId> = report.cases.iter().map(|c| c.case_id).collect();
    assert_eq!(recorded, reported);
}

#[tokio::test]
async fn sequential_and_concurrent_runs_agree() {
    let behavior = SimulatorBehavior::new().with_reply_for(
        "import-remote-origin-empty",
        ReplyBehavior::Send(serde_json::Value::String("RESOLVED".into())),
    );

    let mut outcomes = Vec::new();
    for max in [1, CASES_PER_LOADER] {
        let config = quick_config().with_max_contexts(max);
        let host = setup_faulty_host(&config, behavior.clone());
        let suite = SuiteRunner::new(host.clone(), RecordingReporter::new(), &config);

        let report = suite.run_all(LoaderKind::Paint, paint_cases()).await;
        assert!(host.stats().peak_open <= max);
        assert!(host.stats().all_closed_exactly_once());
        outcomes.push(verdicts(&report));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    // The forced RESOLVED only contradicts the `'self'` policy
    assert_eq!(
        outcomes[0].values().filter(|s| **s == CaseStatus::Failed).count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn silent_contexts_fail_alone_and_are_closed() {
    let config = quick_config();
    let behavior = SimulatorBehavior::new().with_reply_for("redirect.py", ReplyBehavior::Silent);
    let host = setup_faulty_host(&config, behavior);
    let reporter = RecordingReporter::new();

    let report = run_content_security_policy_tests(
        LoaderKind::Audio,
        host.clone(),
        reporter.clone(),
        &config,
    )
    .wait()
    .await
    .unwrap();

    let redirected = |category: ScriptCategory| {
        matches!(
            category,
            ScriptCategory::DirectRemoteRedirected | ScriptCategory::InsecureRedirected
        )
    };
    let expected_failures = paint_cases()
        .iter()
        .filter(|c| redirected(c.category()))
        .count();
    assert_eq!(report.failed, expected_failures);

    for case in &report.cases {
        let category = reporter
            .registered()
            .iter()
            .find(|c| c.id() == case.case_id)
            .map(|c| c.category())
            .unwrap();
        if redirected(category) {
            assert_eq!(
                case.failure.as_ref().and_then(|f| f.error.clone()),
                Some(HarnessError::ExchangeTimeout { waited_ms: 200 })
            );
        } else {
            assert!(case.passed(), "{} {:?}", case.label, case.failure);
        }
    }
    assert!(host.stats().all_closed_exactly_once());
}

#[tokio::test(start_paused = true)]
async fn launch_timeouts_still_close_every_context() {
    let config = quick_config();
    let behavior = SimulatorBehavior::new().with_ready(ReadyBehavior::Silent);
    let host = setup_faulty_host(&config, behavior);

    let report = run_content_security_policy_tests(
        LoaderKind::Layout,
        host.clone(),
        RecordingReporter::new(),
        &config,
    )
    .wait()
    .await
    .unwrap();

    assert_eq!(report.failed, CASES_PER_LOADER);
    assert_eq!(report.launch_failures, CASES_PER_LOADER);
    assert_eq!(report.timeouts, CASES_PER_LOADER);
    assert!(report
        .cases
        .iter()
        .all(|c| c.failure.as_ref().map(|f| f.kind.as_str()) == Some("launch_timeout")));
    let stats = host.stats();
    assert_eq!(stats.opened, CASES_PER_LOADER);
    assert!(stats.requests.is_empty());
    assert!(stats.all_closed_exactly_once());
}

#[tokio::test]
async fn hung_up_contexts_are_reported_as_closed() {
    let config = quick_config();
    let behavior = SimulatorBehavior::new().with_ready(ReadyBehavior::HangUp);
    let host = setup_faulty_host(&config, behavior);

    let report = run_content_security_policy_tests(
        LoaderKind::Paint,
        host.clone(),
        RecordingReporter::new(),
        &config,
    )
    .wait()
    .await
    .unwrap();

    assert!(report
        .cases
        .iter()
        .all(|c| matches!(c.error(), Some(HarnessError::ContextClosed(_)))));
    assert!(host.stats().all_closed_exactly_once());
}

#[tokio::test(start_paused = true)]
async fn capacity_ceiling_holds_under_slow_contexts() {
    let config = HarnessConfig::new().with_max_contexts(2);
    let behavior = SimulatorBehavior::new()
        .with_delays(Duration::from_millis(30), Duration::from_millis(50));
    let host = setup_faulty_host(&config, behavior);
    let suite = SuiteRunner::new(host.clone(), RecordingReporter::new(), &config);

    let report = suite.run_all(LoaderKind::Paint, paint_cases()).await;

    assert!(report.all_passed(), "{}", report.generate_text());
    assert_eq!(host.stats().peak_open, 2);
    assert_eq!(suite.pool_stats().peak_active, 2);
    assert_eq!(suite.pool_stats().active_count, 0);
}

#[tokio::test]
async fn open_failures_fail_every_case_without_closes() {
    let config = quick_config();
    let host = setup_faulty_host(&config, SimulatorBehavior::new().failing_open());
    let reporter = RecordingReporter::new();

    let report = run_content_security_policy_tests(
        LoaderKind::Animation,
        host.clone(),
        reporter.clone(),
        &config,
    )
    .wait()
    .await
    .unwrap();

    assert_eq!(report.failed, CASES_PER_LOADER);
    assert_eq!(reporter.record_count(), CASES_PER_LOADER);
    assert!(reporter
        .record_for(CaseId(0))
        .is_some_and(|r| r.failure.is_some_and(|f| f.kind == "host")));
    assert_eq!(host.stats().total_close_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stopped_admission_fails_queued_cases_only() {
    let config = HarnessConfig::new().with_max_contexts(1);
    let behavior = SimulatorBehavior::new()
        .with_delays(Duration::from_millis(30), Duration::from_millis(50));
    let host = setup_faulty_host(&config, behavior);
    let reporter = RecordingReporter::new();

    let handle = run_content_security_policy_tests(
        LoaderKind::Paint,
        host.clone(),
        reporter.clone(),
        &config,
    );
    // First case is launching, the rest wait for the single slot
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.stop_admission();

    let report = handle.wait().await.unwrap();
    assert_eq!(report.total, CASES_PER_LOADER);
    assert_eq!(report.passed, 1);
    assert!(report.cases[0].passed());
    assert!(report
        .failures()
        .all(|c| c.failure.as_ref().is_some_and(|f| f.kind == "pool")));
    assert_eq!(reporter.record_count(), CASES_PER_LOADER);

    let stats = host.stats();
    assert_eq!(stats.opened, 1);
    assert!(stats.all_closed_exactly_once());
}

#[tokio::test(start_paused = true)]
async fn aborted_suite_closes_contexts_in_flight() {
    let config = HarnessConfig::new().with_max_contexts(4);
    let behavior = SimulatorBehavior::new().with_delays(Duration::from_secs(1), Duration::ZERO);
    let host = setup_faulty_host(&config, behavior);

    let handle = run_content_security_policy_tests(
        LoaderKind::Layout,
        host.clone(),
        RecordingReporter::new(),
        &config,
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_finished());
    assert_eq!(host.stats().open_now, 4);

    handle.abort();
    let err = handle.wait().await.unwrap_err();
    assert!(err.is_cancelled());

    // Dropped handles close their contexts from background tasks
    for _ in 0..100 {
        if host.stats().open_now == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let stats = host.stats();
    assert_eq!(stats.opened, 4);
    assert!(stats.requests.is_empty());
    assert!(stats.all_closed_exactly_once());
}
