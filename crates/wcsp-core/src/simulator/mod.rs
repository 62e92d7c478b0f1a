//! Simulated context host
//!
//! In-process [`ContextHost`] used by the test suites and the `simulate`
//! command. Every opened context is a tokio task that:
//! 1. Sends the ready signal (or misbehaves, per [`ReadyBehavior`])
//! 2. Accepts one script-load request
//! 3. Replies with the outcome of [`ScriptWorld::load`] (or misbehaves, per [`ReplyBehavior`])
//! 4. Stays alive until the harness closes it
//!
//! The host records opens, closes per context and the peak number of
//! simultaneously open contexts so cleanup and capacity can be asserted.

pub mod policy;

pub use policy::{BlockReason, PolicyModel, ScriptWorld, SourceExpression};

use crate::config::HarnessConfig;
use crate::error::{ConfigError, HostError};
use crate::host::{ContextChannel, ContextEndpoint, ContextHost};
use crate::types::{ContextId, OutcomeKind, ScriptLoadRequest, READY_SIGNAL};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

const CHANNEL_BUFFER: usize = 8;

/// What a context sends first
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyBehavior {
    /// The ready literal
    Loaded,
    /// Nothing at all
    Silent,
    /// An arbitrary message
    Send(Value),
    /// Hang up without sending
    HangUp,
}

/// How a context answers its request
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBehavior {
    /// Evaluate the load against the simulated policy model
    Evaluate,
    /// Never answer
    Silent,
    /// Send an arbitrary message
    Send(Value),
}

/// Fault injection knobs
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorBehavior {
    pub ready: ReadyBehavior,
    pub reply: ReplyBehavior,
    /// Replies for requests whose script URL contains the key
    pub reply_overrides: Vec<(String, ReplyBehavior)>,
    pub ready_delay: Duration,
    pub reply_delay: Duration,
    pub fail_open: bool,
    pub fail_close: bool,
}

impl Default for SimulatorBehavior {
    fn default() -> Self {
        Self {
            ready: ReadyBehavior::Loaded,
            reply: ReplyBehavior::Evaluate,
            reply_overrides: Vec::new(),
            ready_delay: Duration::ZERO,
            reply_delay: Duration::ZERO,
            fail_open: false,
            fail_close: false,
        }
    }
}

impl SimulatorBehavior {
    /// Well-behaved contexts
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_ready(mut self, ready: ReadyBehavior) -> Self {
        self.ready = ready;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reply(mut self, reply: ReplyBehavior) -> Self {
        self.reply = reply;
        self
    }

    /// Override the reply for scripts whose URL contains `pattern`
    #[inline]
    #[must_use]
    pub fn with_reply_for(mut self, pattern: impl Into<String>, reply: ReplyBehavior) -> Self {
        self.reply_overrides.push((pattern.into(), reply));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_delays(mut self, ready: Duration, reply: Duration) -> Self {
        self.ready_delay = ready;
        self.reply_delay = reply;
        self
    }

    #[inline]
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Close still ends the context, then reports an error
    #[inline]
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn reply_for(&self, script_url: &str) -> &ReplyBehavior {
        self.reply_overrides
            .iter()
            .find(|(pattern, _)| script_url.contains(pattern.as_str()))
            .map_or(&self.reply, |(_, reply)| reply)
    }
}

/// Host activity counters
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    /// Contexts successfully opened
    pub opened: usize,
    /// Close calls per context
    pub close_calls: HashMap<ContextId, usize>,
    /// Contexts open right now
    pub open_now: usize,
    /// Highest simultaneous open count
    pub peak_open: usize,
    /// Every request received, in arrival order
    pub requests: Vec<ScriptLoadRequest>,
    opened_ids: Vec<ContextId>,
}

impl SimulatorStats {
    /// Close calls received for `id`
    #[must_use]
    pub fn close_count(&self, id: ContextId) -> usize {
        self.close_calls.get(&id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_close_calls(&self) -> usize {
        self.close_calls.values().sum()
    }

    /// Every opened context was closed, and none twice
    #[must_use]
    pub fn all_closed_exactly_once(&self) -> bool {
        self.open_now == 0
            && self.close_calls.len() == self.opened_ids.len()
            && self
                .opened_ids
                .iter()
                .all(|id| self.close_calls.get(id) == Some(&1))
    }
}

/// In-process context host
#[derive(Debug)]
pub struct SimulatedHost {
    world: Arc<ScriptWorld>,
    behavior: Arc<SimulatorBehavior>,
    contexts: DashMap<ContextId, JoinHandle<()>>,
    stats: Arc<Mutex<SimulatorStats>>,
}

impl SimulatedHost {
    /// Well-behaved host for `config`
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the test base URL does not parse.
    pub fn new(config: &HarnessConfig) -> Result<Self, ConfigError> {
        Self::with_behavior(config, SimulatorBehavior::default())
    }

    /// Host with fault injection
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the test base URL does not parse.
    pub fn with_behavior(
        config: &HarnessConfig,
        behavior: SimulatorBehavior,
    ) -> Result<Self, ConfigError> {
        let base_url = config.test_base_url();
        let base = Url::parse(&base_url)
            .map_err(|e| ConfigError::Invalid(format!("test base url {base_url:?}: {e}")))?;
        Ok(Self {
            world: Arc::new(ScriptWorld::new(config.host_info.clone(), base)),
            behavior: Arc::new(behavior),
            contexts: DashMap::new(),
            stats: Arc::new(Mutex::new(SimulatorStats::default())),
        })
    }

    /// Snapshot of host activity
    #[must_use]
    pub fn stats(&self) -> SimulatorStats {
        self.stats.lock().clone()
    }

    /// Outcome a well-behaved context reports for this pair
    #[must_use]
    pub fn evaluate(&self, window_url: &str, script_url: &str) -> OutcomeKind {
        evaluate(&self.world, window_url, script_url)
    }
}

fn evaluate(world: &ScriptWorld, window_url: &str, script_url: &str) -> OutcomeKind {
    match world.load(window_url, script_url) {
        Ok(()) => OutcomeKind::Resolved,
        Err(reason) => {
            tracing::debug!("Simulated load of {} blocked: {:?}", script_url, reason);
            OutcomeKind::Rejected
        }
    }
}

#[async_trait::async_trait]
impl ContextHost for SimulatedHost {
    async fn open(&self, url: &str) -> Result<ContextChannel, HostError> {
        if self.behavior.fail_open {
            return Err(HostError::OpenFailed(format!("simulated failure opening {url}")));
        }
        self.world
            .document_url(url)
            .map_err(|e| HostError::OpenFailed(format!("{e:?}")))?;

        let id = ContextId::new();
        let (channel, endpoint) = ContextChannel::pair(id, CHANNEL_BUFFER);
        let task = tokio::spawn(run_context(
            endpoint,
            url.to_string(),
            Arc::clone(&self.world),
            Arc::clone(&self.behavior),
            Arc::clone(&self.stats),
        ));
        self.contexts.insert(id, task);

        let mut stats = self.stats.lock();
        stats.opened += 1;
        stats.opened_ids.push(id);
        stats.open_now += 1;
        stats.peak_open = stats.peak_open.max(stats.open_now);

        Ok(channel)
    }

    async fn close(&self, id: ContextId) -> Result<(), HostError> {
        let removed = self.contexts.remove(&id);
        {
            let mut stats = self.stats.lock();
            *stats.close_calls.entry(id).or_insert(0) += 1;
            if removed.is_some() {
                stats.open_now -= 1;
            }
        }

        let Some((_, task)) = removed else {
            return Err(HostError::UnknownContext(id));
        };
        task.abort();

        if self.behavior.fail_close {
            return Err(HostError::CloseFailed {
                id,
                reason: "simulated close failure".to_string(),
            });
        }
        Ok(())
    }
}

async fn run_context(
    mut endpoint: ContextEndpoint,
    window_url: String,
    world: Arc<ScriptWorld>,
    behavior: Arc<SimulatorBehavior>,
    stats: Arc<Mutex<SimulatorStats>>,
) {
    if !behavior.ready_delay.is_zero() {
        tokio::time::sleep(behavior.ready_delay).await;
    }
    let ready = match &behavior.ready {
        ReadyBehavior::Loaded => Some(Value::String(READY_SIGNAL.to_string())),
        ReadyBehavior::Silent => None,
        ReadyBehavior::Send(message) => Some(message.clone()),
        ReadyBehavior::HangUp => return,
    };
    if let Some(message) = ready {
        if endpoint.outbound.send(message).await.is_err() {
            return;
        }
    }

    let Some(message) = endpoint.inbound.recv().await else {
        return;
    };
    let request: ScriptLoadRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(context = %endpoint.id, "Malformed request: {}", e);
            std::future::pending::<()>().await;
            return;
        }
    };
    stats.lock().requests.push(request.clone());

    if !behavior.reply_delay.is_zero() {
        tokio::time::sleep(behavior.reply_delay).await;
    }
    let reply = match behavior.reply_for(&request.script_url) {
        ReplyBehavior::Evaluate => Some(Value::String(
            evaluate(&world, &window_url, &request.script_url)
                .as_literal()
                .to_string(),
        )),
        ReplyBehavior::Silent => None,
        ReplyBehavior::Send(message) => Some(message.clone()),
    };
    if let Some(reply) = reply {
        let _ = endpoint.outbound.send(reply).await;
    }

    // A real context stays open until its opener closes it
    std::future::pending::<()>().await;
}
