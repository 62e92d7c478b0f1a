//! Outcome comparator
//!
//! Maps raw reply literals to [`OutcomeKind`] and checks them against expectations.

use crate::error::HarnessError;
use crate::types::OutcomeKind;

/// Classify a raw reply literal
///
/// # Errors
/// `HarnessError::UnrecognizedOutcome` for anything but `"RESOLVED"` or `"REJECTED"`.
pub fn classify(raw: &str) -> Result<OutcomeKind, HarnessError> {
    match raw {
        "RESOLVED" => Ok(OutcomeKind::Resolved),
        "REJECTED" => Ok(OutcomeKind::Rejected),
        other => Err(HarnessError::UnrecognizedOutcome {
            raw: other.to_string(),
        }),
    }
}

/// Compare an observed outcome against the expected one
///
/// # Errors
/// `HarnessError::OutcomeMismatch` when they differ.
pub fn compare(expected: OutcomeKind, observed: OutcomeKind) -> Result<(), HarnessError> {
    if expected == observed {
        Ok(())
    } else {
        Err(HarnessError::OutcomeMismatch { expected, observed })
    }
}
