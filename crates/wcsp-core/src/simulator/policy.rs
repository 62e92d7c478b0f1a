//! Minimal policy model for the simulated host
//!
//! Understands just enough of the security policy to exercise the matrix:
//! - `script-src` (falling back to `default-src`) with `'self'`, `*` and
//!   explicit origins; other keywords never match a URL
//! - `upgrade-insecure-requests`
//! - mixed-content blocking for secure documents
//!
//! `worker-src` is parsed and ignored: worklets obey `script-src`.

use crate::config::HostInfo;
use crate::matrix::{redirect_url, REDIRECT_PATH};
use url::{Origin, Url};

const HEADER_PIPE: &str = "pipe=header(";
const MAX_FETCH_DEPTH: usize = 8;

/// One source expression of a fetch directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceExpression {
    /// `'self'`
    SelfOrigin,
    /// `*`
    Wildcard,
    /// Explicit scheme/host/port
    Origin(Origin),
    /// Any other keyword, e.g. `'unsafe-inline'`
    Keyword(String),
}

impl SourceExpression {
    fn parse(token: &str) -> Self {
        match token {
            "'self'" => Self::SelfOrigin,
            "*" => Self::Wildcard,
            other => match Url::parse(other) {
                Ok(url) if url.has_host() => Self::Origin(url.origin()),
                _ => Self::Keyword(other.to_string()),
            },
        }
    }

    fn matches(&self, url: &Url, document: &Url) -> bool {
        match self {
            Self::SelfOrigin => url.origin() == document.origin(),
            Self::Wildcard => matches!(url.scheme(), "http" | "https"),
            Self::Origin(origin) => &url.origin() == origin,
            Self::Keyword(_) => false,
        }
    }
}

/// Parsed policy of a window document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyModel {
    script_src: Option<Vec<SourceExpression>>,
    default_src: Option<Vec<SourceExpression>>,
    upgrade_insecure_requests: bool,
}

impl PolicyModel {
    /// Policy the header fixture would emit for `window_url`
    ///
    /// Reads the raw `pipe=header(Content-Security-Policy, …)` instruction;
    /// windows without one get the empty policy.
    #[must_use]
    pub fn from_window_url(window_url: &str) -> Self {
        let Some(start) = window_url.find(HEADER_PIPE) else {
            return Self::default();
        };
        let rest = &window_url[start + HEADER_PIPE.len()..];
        let Some(end) = rest.rfind(')') else {
            return Self::default();
        };
        let Some((name, value)) = rest[..end].split_once(',') else {
            return Self::default();
        };
        if name.trim().eq_ignore_ascii_case("Content-Security-Policy") {
            Self::parse(value)
        } else {
            Self::default()
        }
    }

    /// Parse a header value
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut policy = Self::default();
        for directive in header.split(';') {
            let mut tokens = directive.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            let sources = || tokens.clone().map(SourceExpression::parse).collect::<Vec<_>>();
            match name.to_ascii_lowercase().as_str() {
                "script-src" if policy.script_src.is_none() => policy.script_src = Some(sources()),
                "default-src" if policy.default_src.is_none() => {
                    policy.default_src = Some(sources());
                }
                "upgrade-insecure-requests" => policy.upgrade_insecure_requests = true,
                _ => {}
            }
        }
        policy
    }

    #[inline]
    #[must_use]
    pub fn upgrades_insecure_requests(&self) -> bool {
        self.upgrade_insecure_requests
    }

    /// Whether scripts may be fetched from `url`
    #[must_use]
    pub fn allows_script(&self, url: &Url, document: &Url) -> bool {
        match self.script_src.as_ref().or(self.default_src.as_ref()) {
            None => true,
            Some(sources) => sources.iter().any(|s| s.matches(url, document)),
        }
    }
}

/// Why a simulated load failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Script URL could not be resolved
    InvalidUrl(String),
    /// Insecure fetch from a secure document
    MixedContent(Url),
    /// Fetch directive refused the URL
    PolicyViolation(Url),
    /// Nothing serves this URL
    NotFound(Url),
    /// Plain HTTP sent to the secure port
    NetworkError(Url),
    /// Redirect or import chain too long
    TooDeep,
}

/// Scripts served by the simulated fixture, and how they load each other
#[derive(Debug, Clone)]
pub struct ScriptWorld {
    host_info: HostInfo,
    base: Url,
}

impl ScriptWorld {
    /// Create new world; relative window URLs resolve against `base`
    #[must_use]
    pub fn new(host_info: HostInfo, base: Url) -> Self {
        Self { host_info, base }
    }

    /// Absolute document URL of `window_url`
    ///
    /// # Errors
    /// `BlockReason::InvalidUrl` if it cannot be resolved.
    pub fn document_url(&self, window_url: &str) -> Result<Url, BlockReason> {
        self.base
            .join(window_url)
            .map_err(|e| BlockReason::InvalidUrl(format!("{window_url}: {e}")))
    }

    /// Load `script_url` the way a worklet in `window_url` would
    ///
    /// # Errors
    /// The first reason any fetch in the redirect/import chain was blocked.
    pub fn load(&self, window_url: &str, script_url: &str) -> Result<(), BlockReason> {
        let document = self.document_url(window_url)?;
        let policy = PolicyModel::from_window_url(window_url);
        let url = document
            .join(script_url)
            .map_err(|e| BlockReason::InvalidUrl(format!("{script_url}: {e}")))?;
        self.fetch(url, &policy, &document, 0)
    }

    fn fetch(
        &self,
        mut url: Url,
        policy: &PolicyModel,
        document: &Url,
        depth: usize,
    ) -> Result<(), BlockReason> {
        if depth > MAX_FETCH_DEPTH {
            return Err(BlockReason::TooDeep);
        }
        if policy.upgrades_insecure_requests() && url.scheme() == "http" {
            // http -> https keeps the explicit port
            let _ = url.set_scheme("https");
        }
        if document.scheme() == "https" && url.scheme() == "http" {
            return Err(BlockReason::MixedContent(url));
        }
        if !policy.allows_script(&url, document) {
            return Err(BlockReason::PolicyViolation(url));
        }
        if url.scheme() == "http" && url.port() == Some(self.host_info.https_port) {
            return Err(BlockReason::NetworkError(url));
        }

        if url.path() == REDIRECT_PATH {
            let location = url
                .query_pairs()
                .find(|(key, _)| key == "location")
                .map(|(_, value)| value.into_owned())
                .ok_or_else(|| BlockReason::NotFound(url.clone()))?;
            let next = url
                .join(&location)
                .map_err(|e| BlockReason::InvalidUrl(format!("{location}: {e}")))?;
            return self.fetch(next, policy, document, depth + 1);
        }

        match self.imported_by(&url)? {
            None => Ok(()),
            Some(import) => {
                let next = Url::parse(&import)
                    .or_else(|_| url.join(&import))
                    .map_err(|e| BlockReason::InvalidUrl(format!("{import}: {e}")))?;
                self.fetch(next, policy, document, depth + 1)
            }
        }
    }

    /// What the script at `url` imports, if anything
    fn imported_by(&self, url: &Url) -> Result<Option<String>, BlockReason> {
        let empty = "/worklets/resources/empty-worklet-script-with-cors-header.js";
        let remote = &self.host_info.https_remote_origin;
        let origin = &self.host_info.origin;
        let upgradeable = self.host_info.upgradeable_origin();
        let via_redirect = |target: String| format!("{origin}{}", redirect_url(&target));

        let file = url.path_segments().and_then(Iterator::last).unwrap_or("");
        let import = match file {
            "empty-worklet-script-with-cors-header.js" => None,
            "import-empty-worklet-script-with-cors-header.js" => {
                Some("empty-worklet-script-with-cors-header.js".to_string())
            }
            "import-remote-origin-empty-worklet-script.sub.js" => Some(format!("{remote}{empty}")),
            "import-remote-origin-redirected-empty-worklet-script.sub.js" => {
                Some(via_redirect(format!("{remote}{empty}")))
            }
            "import-insecure-origin-empty-worklet-script.sub.js" => {
                Some(format!("{upgradeable}{empty}"))
            }
            "import-insecure-origin-redirected-empty-worklet-script.sub.js" => {
                Some(via_redirect(format!("{upgradeable}{empty}")))
            }
            _ => return Err(BlockReason::NotFound(url.clone())),
        };
        Ok(import)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::policy_window_url;

    fn world() -> ScriptWorld {
        let base = Url::parse("https://web-platform.test:8443/worklets/").unwrap();
        ScriptWorld::new(HostInfo::default(), base)
    }

    const REMOTE: &str =
        "https://www1.web-platform.test:8443/worklets/resources/empty-worklet-script-with-cors-header.js";

    #[test]
    fn parses_pipe_header() {
        let policy = PolicyModel::from_window_url(&policy_window_url("upgrade-insecure-requests"));
        assert!(policy.upgrades_insecure_requests());
        assert_eq!(
            PolicyModel::from_window_url("resources/addmodule-window.html"),
            PolicyModel::default()
        );
    }

    #[test]
    fn self_directive_blocks_remote() {
        let window = policy_window_url("script-src 'self' 'unsafe-inline'");
        assert!(matches!(
            world().load(&window, REMOTE),
            Err(BlockReason::PolicyViolation(_))
        ));
    }

    #[test]
    fn wildcard_allows_remote() {
        let window = policy_window_url("script-src * 'unsafe-inline'");
        assert_eq!(world().load(&window, REMOTE), Ok(()));
    }

    #[test]
    fn worker_src_does_not_apply() {
        let window = policy_window_url("worker-src 'self' 'unsafe-inline'");
        assert_eq!(world().load(&window, REMOTE), Ok(()));
    }

    #[test]
    fn default_src_is_the_fallback() {
        let policy = PolicyModel::parse("default-src 'self'");
        let document = Url::parse("https://web-platform.test:8443/w.html").unwrap();
        assert!(!policy.allows_script(&Url::parse(REMOTE).unwrap(), &document));
    }

    #[test]
    fn insecure_script_is_mixed_content() {
        let insecure =
            "http://web-platform.test:8000/worklets/resources/empty-worklet-script-with-cors-header.js";
        assert!(matches!(
            world().load("resources/addmodule-window.html", insecure),
            Err(BlockReason::MixedContent(_))
        ));
    }

    #[test]
    fn upgrade_rewrites_scheme_only() {
        let window = policy_window_url("upgrade-insecure-requests");
        let upgradeable =
            "http://web-platform.test:8443/worklets/resources/empty-worklet-script-with-cors-header.js";
        assert_eq!(world().load(&window, upgradeable), Ok(()));
    }

    #[test]
    fn redirected_import_checks_final_target() {
        let window = policy_window_url("script-src 'self' 'unsafe-inline'");
        assert!(matches!(
            world().load(&window, "import-remote-origin-redirected-empty-worklet-script.sub.js"),
            Err(BlockReason::PolicyViolation(url)) if url.host_str() == Some("www1.web-platform.test")
        ));
    }

    #[test]
    fn unknown_script_is_not_found() {
        assert!(matches!(
            world().load("resources/addmodule-window.html", "missing.js"),
            Err(BlockReason::NotFound(_))
        ));
    }
}
