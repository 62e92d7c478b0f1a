//! Properties of the generated case matrix

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use wcsp_core::{
    FixtureKind, HarnessConfig, HostInfo, LoaderKind, MatrixBuilder, OutcomeKind, ScriptCategory,
    CASES_PER_LOADER,
};
use wcsp_test_utils::{case_labelled, paint_cases};

const REMOTE_SCRIPT: &str =
    "https://www1.web-platform.test:8443/worklets/resources/empty-worklet-script-with-cors-header.js";

#[test]
fn policy_cases_inherit_policy_expectation() {
    let builder = MatrixBuilder::default();
    let policies = builder.policy_configurations();
    let cases = builder.build(LoaderKind::Animation);

    let policy_cases: Vec<_> = cases
        .iter()
        .filter_map(|c| match c.fixture() {
            FixtureKind::Policy(index) => Some((c, &policies[index])),
            _ => None,
        })
        .collect();

    assert_eq!(policy_cases.len(), 20);
    for (case, policy) in policy_cases {
        assert_eq!(case.window_url(), policy.window_url);
        assert_eq!(case.expected_outcome(), policy.expected_cross_origin_outcome);
        assert!(case.label().ends_with(&policy.description), "{}", case.label());
    }
}

#[test]
fn mixed_content_cases_are_rejected() {
    let cases = paint_cases();
    let mixed: Vec<_> = cases
        .iter()
        .filter(|c| c.fixture() == FixtureKind::MixedContent)
        .collect();

    assert_eq!(mixed.len(), 4);
    for case in mixed {
        assert_eq!(case.expected_outcome(), OutcomeKind::Rejected);
        assert_eq!(case.window_url(), "resources/addmodule-window.html");
        assert!(case.category().is_insecure());
    }
}

#[test]
fn upgrade_cases_are_resolved() {
    let cases = paint_cases();
    let upgrade: Vec<_> = cases
        .iter()
        .filter(|c| c.fixture() == FixtureKind::Upgrade)
        .collect();

    assert_eq!(upgrade.len(), 4);
    for case in upgrade {
        assert_eq!(case.expected_outcome(), OutcomeKind::Resolved);
        assert!(case.window_url().contains("upgrade-insecure-requests"));
    }
}

#[test]
fn self_policy_blocks_remote_script() {
    let cases = paint_cases();
    let case = case_labelled(
        &cases,
        "A remote-origin worklet should be blocked by the script-src 'self' directive.",
    );
    assert!(case.window_url().contains("script-src 'self' 'unsafe-inline'"));
    assert_eq!(case.script_url(), REMOTE_SCRIPT);
    assert_eq!(case.expected_outcome(), OutcomeKind::Rejected);
}

#[test]
fn wildcard_policy_allows_same_remote_script() {
    let cases = paint_cases();
    let case = case_labelled(
        &cases,
        "A remote-origin worklet should not be blocked because the script-src * directive \
         allows it.",
    );
    assert!(case.window_url().contains("script-src * 'unsafe-inline'"));
    assert_eq!(case.script_url(), REMOTE_SCRIPT);
    assert_eq!(case.expected_outcome(), OutcomeKind::Resolved);
}

#[test]
fn plain_window_rejects_insecure_script() {
    let cases = paint_cases();
    let case = cases
        .iter()
        .find(|c| {
            c.fixture() == FixtureKind::MixedContent
                && c.category() == ScriptCategory::InsecureDirect
        })
        .unwrap();
    assert!(case.script_url().starts_with("http://web-platform.test:8000/"));
    assert_eq!(case.expected_outcome(), OutcomeKind::Rejected);
}

#[test]
fn upgrade_window_resolves_http_url_on_secure_port() {
    let cases = paint_cases();
    let case = cases
        .iter()
        .find(|c| {
            c.fixture() == FixtureKind::Upgrade && c.category() == ScriptCategory::InsecureDirect
        })
        .unwrap();
    assert!(case.script_url().starts_with("http://web-platform.test:8443/"));
    assert_eq!(case.expected_outcome(), OutcomeKind::Resolved);
}

#[test]
fn loader_kind_only_changes_loader_field() {
    let builder = MatrixBuilder::default();
    let paint = builder.build(LoaderKind::Paint);
    let layout = builder.build(LoaderKind::Layout);

    for (p, l) in paint.iter().zip(&layout) {
        assert_eq!(p.id(), l.id());
        assert_eq!(p.label(), l.label());
        assert_eq!(p.window_url(), l.window_url());
        assert_eq!(p.script_url(), l.script_url());
        assert_eq!(l.loader_kind(), LoaderKind::Layout);
    }
}

#[test]
fn custom_origins_flow_into_urls() {
    let host_info = HostInfo {
        origin: "https://localhost:9443".into(),
        https_remote_origin: "https://remote.localhost:9443".into(),
        http_origin: "http://localhost:9000".into(),
        original_host: "localhost".into(),
        https_port: 9443,
    };
    let config = HarnessConfig::new().with_host_info(host_info);
    assert!(config.validate().is_ok());
    let cases = MatrixBuilder::new(config.host_info).build(LoaderKind::Audio);

    assert_eq!(cases.len(), CASES_PER_LOADER);
    assert!(cases
        .iter()
        .any(|c| c.script_url().starts_with("https://remote.localhost:9443/")));
    assert!(cases
        .iter()
        .any(|c| c.script_url().starts_with("http://localhost:9443/")));
    let explicit = "script-src https://localhost:9443 https://remote.localhost:9443";
    assert!(cases.iter().any(|c| c.window_url().contains(explicit)));
}

proptest! {
    #[test]
    fn build_is_deterministic_for_any_loader(index in 0usize..4) {
        let loader = LoaderKind::ALL[index];
        let builder = MatrixBuilder::default();
        let first = builder.build(loader);
        let second = builder.build(loader);

        prop_assert_eq!(first.len(), CASES_PER_LOADER);
        prop_assert_eq!(&first, &second);

        let labels: HashSet<_> = first.iter().map(|c| c.label().to_string()).collect();
        prop_assert_eq!(labels.len(), CASES_PER_LOADER);
    }
}
