//! Obligation check results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::CpuState;

/// Outcome of discharging one proof obligation.
///
/// Exactly one of `verified`, `has_ceg`, `has_error` is set. A
/// counterexample carries all four states: the two starting states that
/// satisfy the hypothesis and the two final states that refute the
/// conclusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// The obligation holds.
    pub verified: bool,

    /// The obligation was refuted; the counterexample states are set.
    pub has_ceg: bool,

    /// The check could not be completed.
    pub has_error: bool,

    /// Diagnostic, set when `has_error`.
    pub error_message: Option<String>,

    pub target_ceg: Option<CpuState>,
    pub rewrite_ceg: Option<CpuState>,
    pub target_final_ceg: Option<CpuState>,
    pub rewrite_final_ceg: Option<CpuState>,

    /// Wall-clock time spent on the check.
    pub duration: Duration,
}

impl CheckResult {
    pub fn verified(duration: Duration) -> Self {
        Self {
            verified: true,
            has_ceg: false,
            has_error: false,
            error_message: None,
            target_ceg: None,
            rewrite_ceg: None,
            target_final_ceg: None,
            rewrite_final_ceg: None,
            duration,
        }
    }

    pub fn counterexample(
        target: CpuState,
        rewrite: CpuState,
        target_final: CpuState,
        rewrite_final: CpuState,
        duration: Duration,
    ) -> Self {
        Self {
            verified: false,
            has_ceg: true,
            has_error: false,
            error_message: None,
            target_ceg: Some(target),
            rewrite_ceg: Some(rewrite),
            target_final_ceg: Some(target_final),
            rewrite_final_ceg: Some(rewrite_final),
            duration,
        }
    }

    pub fn error(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            verified: false,
            has_ceg: false,
            has_error: true,
            error_message: Some(message.into()),
            target_ceg: None,
            rewrite_ceg: None,
            target_final_ceg: None,
            rewrite_final_ceg: None,
            duration,
        }
    }

    /// Whether this is a usable verdict rather than a failure report.
    pub fn is_definitive(&self) -> bool {
        !self.has_error
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.verified {
            write!(f, "VERIFIED")
        } else if self.has_ceg {
            write!(f, "FAILED (counterexample)")
        } else {
            write!(
                f,
                "ERROR: {}",
                self.error_message.as_deref().unwrap_or("unspecified")
            )
        }
    }
}
