//! Host context primitives
//!
//! The environment that actually creates browsing contexts is external.
//! Implement [`ContextHost`] to plug one in; [`crate::simulator::SimulatedHost`]
//! is the in-process implementation used by tests and the CLI.

use crate::error::HostError;
use crate::types::ContextId;
use serde_json::Value;
use tokio::sync::mpsc;

/// Untyped message channel to one live context
///
/// The transport carries arbitrary JSON; the launcher and messenger impose
/// the ready/request/reply schema on top of it.
#[derive(Debug)]
pub struct ContextChannel {
    /// Host-assigned context ID
    pub id: ContextId,
    /// Messages into the context
    pub outbound: mpsc::Sender<Value>,
    /// Messages from the context
    pub inbound: mpsc::Receiver<Value>,
}

impl ContextChannel {
    /// Create a channel pair: the harness side and the context side
    ///
    /// The context side's sender feeds `inbound`, its receiver drains `outbound`.
    #[must_use]
    pub fn pair(id: ContextId, buffer: usize) -> (Self, ContextEndpoint) {
        let (to_context, from_harness) = mpsc::channel(buffer);
        let (to_harness, from_context) = mpsc::channel(buffer);

        (
            Self {
                id,
                outbound: to_context,
                inbound: from_context,
            },
            ContextEndpoint {
                id,
                outbound: to_harness,
                inbound: from_harness,
            },
        )
    }
}

/// Context-side end of a [`ContextChannel`]
#[derive(Debug)]
pub struct ContextEndpoint {
    pub id: ContextId,
    /// Messages to the harness
    pub outbound: mpsc::Sender<Value>,
    /// Messages from the harness
    pub inbound: mpsc::Receiver<Value>,
}

/// Context creation facility
///
/// `open` starts loading `url` in a fresh isolated context and returns its
/// channel immediately; readiness is signaled in-band.
#[async_trait::async_trait]
pub trait ContextHost: Send + Sync {
    /// Open a new context at `url`
    async fn open(&self, url: &str) -> Result<ContextChannel, HostError>;

    /// Close a context previously returned by `open`
    async fn close(&self, id: ContextId) -> Result<(), HostError>;
}
