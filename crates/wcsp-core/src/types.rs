//! Core types for WCSP
//!
//! Defines the fundamental types for the orchestrator:
//! - Loader kinds and outcome kinds
//! - Policy configurations and script scenarios
//! - Test cases and their identifiers
//! - Context identifiers and wire messages

use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

/// Literal a context sends once it has finished initializing
pub const READY_SIGNAL: &str = "LOADED";

/// Kind of worklet loader under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    /// CSS paint worklet
    Paint,
    /// Audio worklet
    Audio,
    /// Animation worklet
    Animation,
    /// CSS layout worklet
    Layout,
}

impl LoaderKind {
    /// All loader kinds, in declaration order
    pub const ALL: [LoaderKind; 4] = [
        LoaderKind::Paint,
        LoaderKind::Audio,
        LoaderKind::Animation,
        LoaderKind::Layout,
    ];

    /// Wire identifier sent as the request `type`
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Paint => "paint",
            LoaderKind::Audio => "audio",
            LoaderKind::Animation => "animation",
            LoaderKind::Layout => "layout",
        }
    }
}

impl std::fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paint" => Ok(LoaderKind::Paint),
            "audio" => Ok(LoaderKind::Audio),
            "animation" => Ok(LoaderKind::Animation),
            "layout" => Ok(LoaderKind::Layout),
            other => Err(format!("unknown loader kind: {other}")),
        }
    }
}

/// Observable outcome of a script load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Load succeeded
    #[serde(rename = "RESOLVED")]
    Resolved,
    /// Load blocked or failed
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl OutcomeKind {
    /// Wire literal for this outcome
    #[inline]
    #[must_use]
    pub fn as_literal(&self) -> &'static str {
        match self {
            OutcomeKind::Resolved => "RESOLVED",
            OutcomeKind::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_literal())
    }
}

impl FromStr for OutcomeKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::outcome::classify(s)
    }
}

/// One browsing-context fixture whose policy header varies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfiguration {
    /// Window URL carrying the header-injection instruction
    pub window_url: String,
    /// Outcome expected for every cross-origin shape under this policy
    pub expected_cross_origin_outcome: OutcomeKind,
    /// Human-readable policy message, appended to scenario subjects
    pub description: String,
}

impl PolicyConfiguration {
    /// Create new policy configuration
    #[inline]
    #[must_use]
    pub fn new(
        window_url: impl Into<String>,
        expected_cross_origin_outcome: OutcomeKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            window_url: window_url.into(),
            expected_cross_origin_outcome,
            description: description.into(),
        }
    }
}

/// Delivery mechanism of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCategory {
    /// Remote-origin script loaded directly
    DirectRemote,
    /// Same-origin script importing a remote-origin script
    ImportRemote,
    /// Remote-origin script importing another remote-origin script
    RemoteImportRemote,
    /// Remote-origin script reached through a same-origin redirect
    DirectRemoteRedirected,
    /// Same-origin script importing a redirected remote-origin script
    ImportRemoteRedirected,
    /// Insecure-origin script loaded directly
    InsecureDirect,
    /// Insecure-origin script reached through a redirect
    InsecureRedirected,
    /// Same-origin script importing an insecure-origin script
    InsecureImport,
    /// Same-origin script importing a redirected insecure-origin script
    InsecureImportRedirected,
}

impl ScriptCategory {
    /// Whether the category references insecure transport
    #[inline]
    #[must_use]
    pub fn is_insecure(&self) -> bool {
        matches!(
            self,
            ScriptCategory::InsecureDirect
                | ScriptCategory::InsecureRedirected
                | ScriptCategory::InsecureImport
                | ScriptCategory::InsecureImportRedirected
        )
    }
}

/// A script-loading shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptScenario {
    /// Absolute or relative URL of the script to load
    pub script_url: String,
    /// Delivery mechanism
    pub category: ScriptCategory,
    /// Subject noun phrase used as the label prefix
    pub subject: String,
}

impl ScriptScenario {
    /// Create new script scenario
    #[inline]
    #[must_use]
    pub fn new(
        script_url: impl Into<String>,
        category: ScriptCategory,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            script_url: script_url.into(),
            category,
            subject: subject.into(),
        }
    }
}

/// Which window fixture a case was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    /// One of the policy configurations, by table position
    Policy(usize),
    /// Permissive policy without upgrade
    MixedContent,
    /// Policy declaring `upgrade-insecure-requests`
    Upgrade,
}

/// Position of a case within its generated matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub u32);

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "case-{:02}", self.0)
    }
}

/// A single conformance test case
///
/// Fields are private so URLs cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    id: CaseId,
    window_url: String,
    script_url: String,
    loader_kind: LoaderKind,
    expected_outcome: OutcomeKind,
    label: String,
    category: ScriptCategory,
    fixture: FixtureKind,
}

impl TestCase {
    /// Create new test case
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CaseId,
        window_url: impl Into<String>,
        script_url: impl Into<String>,
        loader_kind: LoaderKind,
        expected_outcome: OutcomeKind,
        label: impl Into<String>,
        category: ScriptCategory,
        fixture: FixtureKind,
    ) -> Self {
        Self {
            id,
            window_url: window_url.into(),
            script_url: script_url.into(),
            loader_kind,
            expected_outcome,
            label: label.into(),
            category,
            fixture,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> CaseId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn window_url(&self) -> &str {
        &self.window_url
    }

    #[inline]
    #[must_use]
    pub fn script_url(&self) -> &str {
        &self.script_url
    }

    #[inline]
    #[must_use]
    pub fn loader_kind(&self) -> LoaderKind {
        self.loader_kind
    }

    #[inline]
    #[must_use]
    pub fn expected_outcome(&self) -> OutcomeKind {
        self.expected_outcome
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn category(&self) -> ScriptCategory {
        self.category
    }

    #[inline]
    #[must_use]
    pub fn fixture(&self) -> FixtureKind {
        self.fixture
    }

    /// Request this case sends into its context
    #[inline]
    #[must_use]
    pub fn request(&self) -> ScriptLoadRequest {
        ScriptLoadRequest::new(self.loader_kind, self.script_url.clone())
    }
}

/// Request message sent from the orchestrator into a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLoadRequest {
    /// Loader kind identifier
    #[serde(rename = "type")]
    pub loader_kind: LoaderKind,
    /// Script URL to load
    pub script_url: String,
}

impl ScriptLoadRequest {
    /// Create new request
    #[inline]
    #[must_use]
    pub fn new(loader_kind: LoaderKind, script_url: impl Into<String>) -> Self {
        Self {
            loader_kind,
            script_url: script_url.into(),
        }
    }
}

/// Identifier of a live execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Ulid);

impl ContextId {
    /// Generate new context ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
