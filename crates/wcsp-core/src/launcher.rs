//! Context launcher
//!
//! Opens an isolated context through a [`ContextHost`] and suspends until the
//! context reports it has finished initializing:
//! - `"LOADED"` as the first message → handle returned
//! - any other first message → `UnexpectedReadySignal`
//! - nothing before the deadline → `LaunchTimeout`
//!
//! Every failure after the host opened the context tears it down before
//! returning, so callers only ever own healthy handles.

use crate::error::{HarnessError, HostError};
use crate::host::{ContextChannel, ContextHost};
use crate::types::{ContextId, READY_SIGNAL};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Ownership of one live context
///
/// Torn down exactly once: explicitly via [`ExecutionContextHandle::teardown`],
/// or, if the handle is dropped without it (panic, cancelled future), by a
/// background close on the current runtime.
pub struct ExecutionContextHandle {
    id: ContextId,
    url: String,
    outbound: mpsc::Sender<Value>,
    inbound: mpsc::Receiver<Value>,
    host: Arc<dyn ContextHost>,
    exchanged: bool,
    closed: bool,
}

impl std::fmt::Debug for ExecutionContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContextHandle")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("exchanged", &self.exchanged)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ExecutionContextHandle {
    fn new(channel: ContextChannel, url: &str, host: Arc<dyn ContextHost>) -> Self {
        Self {
            id: channel.id,
            url: url.to_string(),
            outbound: channel.outbound,
            inbound: channel.inbound,
            host,
            exchanged: false,
            closed: false,
        }
    }

    /// Get context ID
    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// URL the context was opened at
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the one exchange has been started
    #[inline]
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.exchanged
    }

    pub(crate) fn mark_spent(&mut self) -> Result<(), HarnessError> {
        if self.exchanged {
            return Err(HarnessError::HandleSpent(self.id));
        }
        self.exchanged = true;
        Ok(())
    }

    pub(crate) fn outbound(&self) -> &mpsc::Sender<Value> {
        &self.outbound
    }

    pub(crate) fn inbound(&mut self) -> &mut mpsc::Receiver<Value> {
        &mut self.inbound
    }

    /// Close the context
    ///
    /// # Errors
    /// Whatever the host reports; the context counts as torn down either way.
    pub async fn teardown(mut self) -> Result<(), HostError> {
        self.closed = true;
        let result = self.host.close(self.id).await;
        match &result {
            Ok(()) => tracing::debug!(context = %self.id, "Context closed"),
            Err(e) => tracing::warn!(context = %self.id, "Context teardown failed: {}", e),
        }
        result
    }
}

impl Drop for ExecutionContextHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let host = Arc::clone(&self.host);
        let id = self.id;
        tracing::warn!(context = %id, "Context dropped without teardown, closing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = host.close(id).await {
                        tracing::warn!(context = %id, "Background teardown failed: {}", e);
                    }
                });
            }
            Err(_) => tracing::error!(context = %id, "No runtime available, context leaked"),
        }
    }
}

/// Opens contexts and waits for their ready signal
#[derive(Clone)]
pub struct ContextLauncher {
    host: Arc<dyn ContextHost>,
    ready_timeout: Duration,
}

impl std::fmt::Debug for ContextLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLauncher")
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

impl ContextLauncher {
    /// Create new launcher
    #[inline]
    #[must_use]
    pub fn new(host: Arc<dyn ContextHost>, ready_timeout: Duration) -> Self {
        Self {
            host,
            ready_timeout,
        }
    }

    /// Launch a context at `url`
    ///
    /// # Errors
    /// - `HarnessError::Host` if the host cannot open the context
    /// - `HarnessError::LaunchTimeout` if no ready signal arrives in time
    /// - `HarnessError::UnexpectedReadySignal` if the first message is not `"LOADED"`
    /// - `HarnessError::ContextClosed` if the context hangs up first
    pub async fn launch(&self, url: &str) -> Result<ExecutionContextHandle, HarnessError> {
        let channel = self.host.open(url).await?;
        let mut handle = ExecutionContextHandle::new(channel, url, Arc::clone(&self.host));
        tracing::debug!(context = %handle.id(), "Opened context at {}", url);

        match self.await_ready(&mut handle).await {
            Ok(()) => Ok(handle),
            Err(err) => {
                tracing::warn!(context = %handle.id(), "Launch failed: {}", err);
                // Close errors are already logged by teardown; the launch error wins.
                let _ = handle.teardown().await;
                Err(err)
            }
        }
    }

    async fn await_ready(&self, handle: &mut ExecutionContextHandle) -> Result<(), HarnessError> {
        let id = handle.id();
        let first = tokio::time::timeout(self.ready_timeout, handle.inbound().recv()).await;
        match first {
            Err(_) => Err(HarnessError::LaunchTimeout {
                url: handle.url().to_string(),
                waited_ms: u64::try_from(self.ready_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(None) => Err(HarnessError::ContextClosed(id)),
            Ok(Some(Value::String(signal))) if signal == READY_SIGNAL => Ok(()),
            Ok(Some(other)) => Err(HarnessError::UnexpectedReadySignal {
                received: other.to_string(),
            }),
        }
    }
}
