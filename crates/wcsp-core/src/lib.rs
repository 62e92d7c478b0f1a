//! WCSP Core - Worklet Content Security Policy conformance orchestrator
//!
//! Verifies that worklet script loading honours the document's policy:
//! - Builds the fixed scenario matrix per loader kind
//! - Launches one isolated context per case and waits for it to become ready
//! - Exchanges a single script-load request for a `RESOLVED`/`REJECTED` reply
//! - Compares the reply against the expected outcome
//! - Tears every context down exactly once, under a capacity ceiling
//!
//! # Example
//!
//! ```rust,ignore
//! use wcsp_core::{run_content_security_policy_tests, HarnessConfig, LoaderKind};
//! use wcsp_core::simulator::SimulatedHost;
//! use wcsp_core::report::TracingReporter;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::new().with_max_contexts(8);
//! let host = Arc::new(SimulatedHost::new(&config)?);
//!
//! let handle = run_content_security_policy_tests(
//!     LoaderKind::Paint,
//!     host,
//!     Arc::new(TracingReporter),
//!     &config,
//! );
//! let report = handle.wait().await?;
//! println!("{}", report.generate_text());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod config;
pub mod error;
pub mod host;
pub mod launcher;
pub mod matrix;
pub mod messenger;
pub mod outcome;
pub mod pool;
pub mod report;
pub mod runner;
pub mod simulator;
pub mod suite;
pub mod types;

// Re-exports for convenience
pub use config::{HarnessConfig, HostInfo};
pub use error::{ConfigError, HarnessError, HostError, PoolError};
pub use host::{ContextChannel, ContextEndpoint, ContextHost};
pub use launcher::{ContextLauncher, ExecutionContextHandle};
pub use matrix::{MatrixBuilder, CASES_PER_LOADER};
pub use messenger::{Exchange, Messenger};
pub use pool::{ContextPermit, ContextPool, PoolStats};
pub use report::{
    CaseFailure, CaseReport, CaseReporter, CaseStatus, SuiteReport, TracingReporter,
};
pub use runner::CaseRunner;
pub use suite::{run_content_security_policy_tests, SuiteHandle, SuiteRunner};
pub use types::{
    CaseId, ContextId, FixtureKind, LoaderKind, OutcomeKind, PolicyConfiguration,
    ScriptCategory, ScriptLoadRequest, ScriptScenario, TestCase, READY_SIGNAL,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with WCSP Core
    pub use crate::{
        run_content_security_policy_tests, CaseReport, CaseReporter, ContextHost, HarnessConfig,
        HarnessError, LoaderKind, MatrixBuilder, OutcomeKind, SuiteHandle, SuiteReport, TestCase,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
