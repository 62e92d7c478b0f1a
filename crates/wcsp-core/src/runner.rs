//! Test case runner
//!
//! Drives one case through its fixed sequence:
//! 1. Launch the window context
//! 2. Exchange the script-load request for a reply
//! 3. Classify the reply
//! 4. Compare against the expectation
//! 5. Tear the context down, whatever happened in 2–4
//!
//! Failures never escape a case: they are folded into its [`CaseReport`].

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::host::ContextHost;
use crate::launcher::{ContextLauncher, ExecutionContextHandle};
use crate::messenger::Messenger;
use crate::outcome;
use crate::report::CaseReport;
use crate::types::{OutcomeKind, TestCase};
use std::sync::Arc;
use std::time::Instant;

/// Runs individual cases against a context host
#[derive(Debug, Clone)]
pub struct CaseRunner {
    launcher: ContextLauncher,
    messenger: Messenger,
}

impl CaseRunner {
    /// Create new runner
    #[inline]
    #[must_use]
    pub fn new(host: Arc<dyn ContextHost>, config: &HarnessConfig) -> Self {
        Self {
            launcher: ContextLauncher::new(host, config.launch_timeout()),
            messenger: Messenger::new(config.exchange_timeout()),
        }
    }

    /// Run one case to its verdict
    pub async fn run(&self, case: &TestCase) -> CaseReport {
        let start = Instant::now();

        let (observed, result, teardown_error) = match self.launcher.launch(case.window_url()).await
        {
            Err(err) => (None, Err(err), None),
            Ok(mut handle) => {
                let (observed, result) = self.drive(&mut handle, case).await;
                let teardown_error = handle.teardown().await.err().map(|e| e.to_string());
                (observed, result, teardown_error)
            }
        };

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        CaseReport::new(case, observed, result, teardown_error, elapsed_ms)
    }

    /// Steps 2–4; the observed outcome survives a mismatch for the diagnostic
    async fn drive(
        &self,
        handle: &mut ExecutionContextHandle,
        case: &TestCase,
    ) -> (Option<OutcomeKind>, Result<(), HarnessError>) {
        let raw = match self.messenger.exchange(handle, &case.request()).await {
            Ok(raw) => raw,
            Err(err) => return (None, Err(err)),
        };
        let observed = match outcome::classify(&raw) {
            Ok(observed) => observed,
            Err(err) => return (None, Err(err)),
        };
        (
            Some(observed),
            outcome::compare(case.expected_outcome(), observed),
        )
    }
}
