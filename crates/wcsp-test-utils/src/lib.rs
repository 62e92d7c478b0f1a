//! Testing utilities for WCSP workspace
//!
//! Shared test helpers, fixtures, and a recording reporter.

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use wcsp_core::simulator::{SimulatedHost, SimulatorBehavior};
use wcsp_core::{
    CaseId, CaseReport, CaseReporter, HarnessConfig, LoaderKind, MatrixBuilder, TestCase,
};

/// Reporter that keeps everything it is told
#[derive(Debug, Default)]
pub struct RecordingReporter {
    registered: Mutex<Vec<TestCase>>,
    records: Mutex<Vec<CaseReport>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn registered(&self) -> Vec<TestCase> {
        self.registered.lock().clone()
    }

    /// Reports in completion order
    pub fn records(&self) -> Vec<CaseReport> {
        self.records.lock().clone()
    }

    pub fn record_for(&self, id: CaseId) -> Option<CaseReport> {
        self.records.lock().iter().find(|r| r.case_id == id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }
}

impl CaseReporter for RecordingReporter {
    fn register(&self, case: &TestCase) {
        self.registered.lock().push(case.clone());
    }

    fn record(&self, report: &CaseReport) {
        self.records.lock().push(report.clone());
    }
}

/// Short timeouts, room for every case at once
pub fn quick_config() -> HarnessConfig {
    HarnessConfig::new()
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200))
        .with_max_contexts(4)
}

pub fn setup_simulated_host(config: &HarnessConfig) -> Arc<SimulatedHost> {
    Arc::new(SimulatedHost::new(config).unwrap())
}

pub fn setup_faulty_host(
    config: &HarnessConfig,
    behavior: SimulatorBehavior,
) -> Arc<SimulatedHost> {
    Arc::new(SimulatedHost::with_behavior(config, behavior).unwrap())
}

pub fn paint_cases() -> Vec<TestCase> {
    MatrixBuilder::default().build(LoaderKind::Paint)
}

/// Case with the given label, panicking if the matrix has none
pub fn case_labelled<'a>(cases: &'a [TestCase], label: &str) -> &'a TestCase {
    cases
        .iter()
        .find(|c| c.label() == label)
        .unwrap_or_else(|| panic!("no case labelled {label:?}"))
}
