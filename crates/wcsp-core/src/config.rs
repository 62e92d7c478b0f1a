//! Harness configuration
//!
//! Origins used to build scenario URLs, timeouts for the two suspension
//! points of a case, and the context capacity ceiling.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Origins of the serving fixture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostInfo {
    /// Origin of the document running the suite
    pub origin: String,
    /// Secure origin on a different host
    pub https_remote_origin: String,
    /// Insecure origin on the document host
    pub http_origin: String,
    /// Host name of the document origin
    pub original_host: String,
    /// Port serving secure transport
    pub https_port: u16,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            origin: "https://web-platform.test:8443".to_string(),
            https_remote_origin: "https://www1.web-platform.test:8443".to_string(),
            http_origin: "http://web-platform.test:8000".to_string(),
            original_host: "web-platform.test".to_string(),
            https_port: 8443,
        }
    }
}

impl HostInfo {
    /// Insecure-scheme URL on the secure port of the document host
    ///
    /// Upgrading rewrites only the scheme, so a successful load proves the
    /// upgrade happened: nothing serves plain HTTP on the secure port.
    #[must_use]
    pub fn upgradeable_origin(&self) -> String {
        format!("http://{}:{}", self.original_host, self.https_port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("origin", &self.origin),
            ("https_remote_origin", &self.https_remote_origin),
            ("http_origin", &self.http_origin),
        ] {
            let url = Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{name} {value:?}: {e}")))?;
            // Origins are concatenated with absolute paths and compared as strings
            if url.origin().ascii_serialization() != *value {
                return Err(ConfigError::Invalid(format!(
                    "{name} {value:?} must be a bare scheme://host[:port] origin"
                )));
            }
        }
        if self.original_host.is_empty() {
            return Err(ConfigError::Invalid("original_host is empty".into()));
        }
        if self.https_port == 0 {
            return Err(ConfigError::Invalid("https_port must be non-zero".into()));
        }
        Ok(())
    }
}

/// WCSP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Serving fixture origins
    pub host_info: HostInfo,
    /// Wait for the ready signal, in milliseconds
    pub launch_timeout_ms: u64,
    /// Wait for the exchange reply, in milliseconds
    pub exchange_timeout_ms: u64,
    /// Contexts allowed open at the same time
    pub max_concurrent_contexts: usize,
    /// Base URL relative window URLs resolve against; derived from the origin when unset
    pub test_base_url: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host_info: HostInfo::default(),
            launch_timeout_ms: 10_000,
            exchange_timeout_ms: 10_000,
            max_concurrent_contexts: 4,
            test_base_url: None,
        }
    }
}

impl HarnessConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max concurrent contexts
    #[inline]
    #[must_use]
    pub fn with_max_contexts(mut self, max: usize) -> Self {
        self.max_concurrent_contexts = max;
        self
    }

    /// With both timeouts
    #[inline]
    #[must_use]
    pub fn with_timeouts(mut self, launch: Duration, exchange: Duration) -> Self {
        self.launch_timeout_ms = u64::try_from(launch.as_millis()).unwrap_or(u64::MAX);
        self.exchange_timeout_ms = u64::try_from(exchange.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With host info
    #[inline]
    #[must_use]
    pub fn with_host_info(mut self, host_info: HostInfo) -> Self {
        self.host_info = host_info;
        self
    }

    #[inline]
    #[must_use]
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }

    /// Base URL relative window and script URLs resolve against
    #[must_use]
    pub fn test_base_url(&self) -> String {
        self.test_base_url
            .clone()
            .unwrap_or_else(|| format!("{}/worklets/", self.host_info.origin))
    }

    /// Parse from TOML and validate
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for bad values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Loading config from {}", path.as_ref().display());
        Self::from_toml_str(&source)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.launch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("launch_timeout_ms must be positive".into()));
        }
        if self.exchange_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "exchange_timeout_ms must be positive".into(),
            ));
        }
        if self.max_concurrent_contexts == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_contexts must be positive".into(),
            ));
        }
        if let Some(base) = &self.test_base_url {
            Url::parse(base)
                .map_err(|e| ConfigError::Invalid(format!("test_base_url {base:?}: {e}")))?;
        }
        self.host_info.validate()
    }
}
