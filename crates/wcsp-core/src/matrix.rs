//! Scenario matrix builder
//!
//! Expands the static fixture tables into a flat, deterministic list of
//! [`TestCase`]s:
//! - 4 policy configurations × 5 remote-script shapes
//! - the mixed-content fixture × 4 insecure shapes
//! - the upgrade fixture × 4 upgradeable shapes
//!
//! The builder performs no I/O. Building twice yields equal sequences.

use crate::config::HostInfo;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use crate::types::{
    CaseId, FixtureKind, LoaderKind, OutcomeKind, PolicyConfiguration, ScriptCategory,
    ScriptScenario, TestCase,
};

/// Window document every case opens
pub const WINDOW_PATH: &str = "resources/addmodule-window.html";

/// Redirect fixture endpoint
pub const REDIRECT_PATH: &str = "/common/redirect.py";

/// Cases produced per loader kind
pub const CASES_PER_LOADER: usize = 28;

const EMPTY_SCRIPT: &str = "/worklets/resources/empty-worklet-script-with-cors-header.js";
const REMOTE_IMPORTING_SCRIPT: &str =
    "/worklets/resources/import-empty-worklet-script-with-cors-header.js";

/// Characters a URI component keeps unescaped
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const MIXED_CONTENT_MESSAGE: &str = "should be blocked because of mixed contents.";
const UPGRADE_MESSAGE: &str = "should not be blocked because of upgrade-insecure-requests.";

/// Window URL asking the header fixture to emit `policy`
#[must_use]
pub fn policy_window_url(policy: &str) -> String {
    format!("{WINDOW_PATH}?pipe=header(Content-Security-Policy, {policy})")
}

/// Same-origin redirect to `location`
#[must_use]
pub fn redirect_url(location: &str) -> String {
    format!(
        "{REDIRECT_PATH}?location={}",
        utf8_percent_encode(location, URI_COMPONENT)
    )
}

/// Builds the conformance matrix for a loader kind
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    host_info: HostInfo,
}

impl MatrixBuilder {
    /// Create new builder
    #[inline]
    #[must_use]
    pub fn new(host_info: HostInfo) -> Self {
        Self { host_info }
    }

    /// Origins used for URL construction
    #[inline]
    #[must_use]
    pub fn host_info(&self) -> &HostInfo {
        &self.host_info
    }

    /// The four `script-src` / `worker-src` policy fixtures
    #[must_use]
    pub fn policy_configurations(&self) -> Vec<PolicyConfiguration> {
        vec![
            PolicyConfiguration::new(
                policy_window_url("script-src 'self' 'unsafe-inline'"),
                OutcomeKind::Rejected,
                "should be blocked by the script-src 'self' directive.",
            ),
            PolicyConfiguration::new(
                policy_window_url(&format!(
                    "script-src {} {} 'unsafe-inline'",
                    self.host_info.origin, self.host_info.https_remote_origin
                )),
                OutcomeKind::Resolved,
                "should be blocked by the script-src directive specifying the origin.",
            ),
            PolicyConfiguration::new(
                policy_window_url("script-src * 'unsafe-inline'"),
                OutcomeKind::Resolved,
                "should not be blocked because the script-src * directive allows it.",
            ),
            PolicyConfiguration::new(
                policy_window_url("worker-src 'self' 'unsafe-inline'"),
                OutcomeKind::Resolved,
                "should not be blocked by the worker-src directive \
                 because worklets obey the script-src directive.",
            ),
        ]
    }

    /// Cross-origin shapes combined with every policy configuration
    #[must_use]
    pub fn remote_scenarios(&self) -> Vec<ScriptScenario> {
        let remote = &self.host_info.https_remote_origin;
        let remote_script = format!("{remote}{EMPTY_SCRIPT}");

        vec![
            ScriptScenario::new(
                remote_script.clone(),
                ScriptCategory::DirectRemote,
                "A remote-origin worklet",
            ),
            ScriptScenario::new(
                "import-remote-origin-empty-worklet-script.sub.js",
                ScriptCategory::ImportRemote,
                "A same-origin worklet importing a remote-origin script",
            ),
            ScriptScenario::new(
                format!("{remote}{REMOTE_IMPORTING_SCRIPT}"),
                ScriptCategory::RemoteImportRemote,
                "A remote-origin worklet importing a remote-origin script",
            ),
            ScriptScenario::new(
                redirect_url(&remote_script),
                ScriptCategory::DirectRemoteRedirected,
                "A remote-origin-redirected worklet",
            ),
            ScriptScenario::new(
                "import-remote-origin-redirected-empty-worklet-script.sub.js",
                ScriptCategory::ImportRemoteRedirected,
                "A same-origin worklet importing a remote-origin-redirected script",
            ),
        ]
    }

    /// Insecure shapes rooted at `insecure_script`
    ///
    /// The import shapes are server-substituted scripts and do not depend on it.
    #[must_use]
    pub fn insecure_scenarios(&self, insecure_script: &str) -> Vec<ScriptScenario> {
        vec![
            ScriptScenario::new(
                insecure_script,
                ScriptCategory::InsecureDirect,
                "An insecure-origin worklet",
            ),
            ScriptScenario::new(
                redirect_url(insecure_script),
                ScriptCategory::InsecureRedirected,
                "An insecure-origin-redirected worklet",
            ),
            ScriptScenario::new(
                "import-insecure-origin-empty-worklet-script.sub.js",
                ScriptCategory::InsecureImport,
                "A same-origin worklet importing an insecure-origin script",
            ),
            ScriptScenario::new(
                "import-insecure-origin-redirected-empty-worklet-script.sub.js",
                ScriptCategory::InsecureImportRedirected,
                "A same-origin worklet importing an insecure-origin-redirected script",
            ),
        ]
    }

    /// Build every case for `loader_kind`
    #[must_use]
    pub fn build(&self, loader_kind: LoaderKind) -> Vec<TestCase> {
        let mut cases = Vec::with_capacity(CASES_PER_LOADER);
        let mut next_id = 0u32;
        let mut push = |cases: &mut Vec<TestCase>,
                        window_url: &str,
                        scenario: &ScriptScenario,
                        expected: OutcomeKind,
                        message: &str,
                        fixture: FixtureKind| {
            cases.push(TestCase::new(
                CaseId(next_id),
                window_url,
                scenario.script_url.clone(),
                loader_kind,
                expected,
                format!("{} {}", scenario.subject, message),
                scenario.category,
                fixture,
            ));
            next_id += 1;
        };

        let remote = self.remote_scenarios();
        for (index, policy) in self.policy_configurations().iter().enumerate() {
            for scenario in &remote {
                push(
                    &mut cases,
                    &policy.window_url,
                    scenario,
                    policy.expected_cross_origin_outcome,
                    &policy.description,
                    FixtureKind::Policy(index),
                );
            }
        }

        let insecure_script = format!("{}{EMPTY_SCRIPT}", self.host_info.http_origin);
        for scenario in &self.insecure_scenarios(&insecure_script) {
            push(
                &mut cases,
                WINDOW_PATH,
                scenario,
                OutcomeKind::Rejected,
                MIXED_CONTENT_MESSAGE,
                FixtureKind::MixedContent,
            );
        }

        let upgrade_window = policy_window_url("upgrade-insecure-requests");
        let upgradeable_script = format!("{}{EMPTY_SCRIPT}", self.host_info.upgradeable_origin());
        for scenario in &self.insecure_scenarios(&upgradeable_script) {
            push(
                &mut cases,
                &upgrade_window,
                scenario,
                OutcomeKind::Resolved,
                UPGRADE_MESSAGE,
                FixtureKind::Upgrade,
            );
        }

        tracing::debug!("Built {} cases for {} loader", cases.len(), loader_kind);
        cases
    }
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        Self::new(HostInfo::default())
    }
}
