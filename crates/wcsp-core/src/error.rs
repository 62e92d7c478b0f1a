//! Error types for WCSP
//!
//! Provides error handling for:
//! - Context launch and ready-signal failures
//! - Cross-context exchange failures
//! - Outcome classification and comparison
//! - Host primitives, pool admission and configuration loading
//!
//! Every `HarnessError` is local to one test case.

use crate::types::{ContextId, OutcomeKind};

/// Case-level harness error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Context never signaled ready
    #[error("context at {url} did not signal ready within {waited_ms}ms")]
    LaunchTimeout { url: String, waited_ms: u64 },

    /// First message from the context was not the ready literal
    #[error("expected ready signal, got {received}")]
    UnexpectedReadySignal { received: String },

    /// Context never replied to the request
    #[error("no reply within {waited_ms}ms")]
    ExchangeTimeout { waited_ms: u64 },

    /// Reply did not match the response schema
    #[error("unexpected message: {received}")]
    UnexpectedMessage { received: String },

    /// Reply literal is not a known outcome
    #[error("unrecognized outcome: {raw:?}")]
    UnrecognizedOutcome { raw: String },

    /// Valid outcome observed but differs from expectation
    #[error("expected {expected}, observed {observed}")]
    OutcomeMismatch {
        expected: OutcomeKind,
        observed: OutcomeKind,
    },

    /// Context channel closed before a message arrived
    #[error("context {0} closed its channel")]
    ContextClosed(ContextId),

    /// Handle already served its one exchange
    #[error("context {0} already completed its exchange")]
    HandleSpent(ContextId),

    /// Request could not be encoded
    #[error("request encoding failed: {0}")]
    Encode(String),

    /// Host primitive failed
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Context pool refused the case
    #[error("context pool error: {0}")]
    Pool(#[from] PoolError),
}

impl HarnessError {
    /// Check if error is a timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::LaunchTimeout { .. } | Self::ExchangeTimeout { .. }
        )
    }

    /// Check if error happened before the exchange started
    #[inline]
    #[must_use]
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::LaunchTimeout { .. }
                | Self::UnexpectedReadySignal { .. }
                | Self::Host(HostError::OpenFailed(_))
        )
    }

    /// Stable identifier used in reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LaunchTimeout { .. } => "launch_timeout",
            Self::UnexpectedReadySignal { .. } => "unexpected_ready_signal",
            Self::ExchangeTimeout { .. } => "exchange_timeout",
            Self::UnexpectedMessage { .. } => "unexpected_message",
            Self::UnrecognizedOutcome { .. } => "unrecognized_outcome",
            Self::OutcomeMismatch { .. } => "outcome_mismatch",
            Self::ContextClosed(_) => "context_closed",
            Self::HandleSpent(_) => "handle_spent",
            Self::Encode(_) => "encode",
            Self::Host(_) => "host",
            Self::Pool(_) => "pool",
        }
    }
}

/// Host primitive errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Context could not be created
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// Context could not be closed
    #[error("close failed for {id}: {reason}")]
    CloseFailed { id: ContextId, reason: String },

    /// Context is not known to the host
    #[error("unknown context: {0}")]
    UnknownContext(ContextId),
}

/// Context pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Pool no longer admits cases
    #[error("context pool closed")]
    Closed,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config value out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}
