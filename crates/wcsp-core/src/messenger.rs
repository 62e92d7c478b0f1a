//! Cross-context messenger
//!
//! One request, one reply, per context. An [`Exchange`] holds the handle's
//! receiver exclusively for its whole lifetime, so the reply it sees can only
//! answer its own request.

use crate::error::HarnessError;
use crate::launcher::ExecutionContextHandle;
use crate::types::ScriptLoadRequest;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Sends script-load requests and awaits their reply
#[derive(Debug, Clone, Copy)]
pub struct Messenger {
    reply_timeout: Duration,
}

impl Messenger {
    /// Create new messenger
    #[inline]
    #[must_use]
    pub fn new(reply_timeout: Duration) -> Self {
        Self { reply_timeout }
    }

    /// Perform the single exchange of `handle`
    ///
    /// Returns the raw reply literal; classification is the caller's job.
    ///
    /// # Errors
    /// - `HarnessError::HandleSpent` on a second exchange
    /// - `HarnessError::ExchangeTimeout` if no reply arrives in time
    /// - `HarnessError::UnexpectedMessage` if the reply is not a string
    /// - `HarnessError::ContextClosed` if the context hangs up
    pub async fn exchange(
        &self,
        handle: &mut ExecutionContextHandle,
        request: &ScriptLoadRequest,
    ) -> Result<String, HarnessError> {
        let exchange = Exchange::begin(handle, request, self.reply_timeout).await?;
        exchange.await_reply().await
    }
}

/// One in-flight request bound to its context
#[derive(Debug)]
pub struct Exchange<'h> {
    handle: &'h mut ExecutionContextHandle,
    deadline: Instant,
    timeout: Duration,
}

impl<'h> Exchange<'h> {
    /// Send `request` and start the reply deadline
    ///
    /// # Errors
    /// `HandleSpent`, `Encode`, `ContextClosed`, or `ExchangeTimeout` if the
    /// context is not accepting messages.
    pub async fn begin(
        handle: &'h mut ExecutionContextHandle,
        request: &ScriptLoadRequest,
        timeout: Duration,
    ) -> Result<Exchange<'h>, HarnessError> {
        handle.mark_spent()?;
        let payload =
            serde_json::to_value(request).map_err(|e| HarnessError::Encode(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        let id = handle.id();
        match tokio::time::timeout_at(deadline, handle.outbound().send(payload)).await {
            Err(_) => return Err(timeout_error(timeout)),
            Ok(Err(_)) => return Err(HarnessError::ContextClosed(id)),
            Ok(Ok(())) => {}
        }
        tracing::debug!(
            context = %id,
            "Sent {} request for {}",
            request.loader_kind,
            request.script_url
        );

        Ok(Self {
            handle,
            deadline,
            timeout,
        })
    }

    /// Wait for the one reply
    ///
    /// # Errors
    /// `ExchangeTimeout`, `ContextClosed`, or `UnexpectedMessage`.
    pub async fn await_reply(self) -> Result<String, HarnessError> {
        let id = self.handle.id();
        let reply = tokio::time::timeout_at(self.deadline, self.handle.inbound().recv()).await;
        match reply {
            Err(_) => Err(timeout_error(self.timeout)),
            Ok(None) => Err(HarnessError::ContextClosed(id)),
            Ok(Some(Value::String(literal))) => {
                tracing::debug!(context = %id, "Received reply {}", literal);
                Ok(literal)
            }
            Ok(Some(other)) => Err(HarnessError::UnexpectedMessage {
                received: other.to_string(),
            }),
        }
    }
}

fn timeout_error(timeout: Duration) -> HarnessError {
    HarnessError::ExchangeTimeout {
        waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}
