//! Outcome of one harness run.

use std::fmt;

use uuid::Uuid;

use super::errors::TestFailure;
use crate::dialect::Dialect;

/// Exactly one of skipped, passed or failed.
#[derive(Debug)]
pub enum Outcome {
    /// The test declared itself inapplicable to the dialect; nothing ran.
    Skipped {
        /// The dialect the test was resolved against
        dialect: Dialect,
    },
    /// Setup, body and teardown all succeeded.
    Passed,
    /// Something failed; this is the cause the runner should see.
    Failed(TestFailure),
}

impl Outcome {
    /// Check if the test passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    /// Check if the test was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }

    /// The failure, if the test failed.
    pub fn failure(&self) -> Option<&TestFailure> {
        match self {
            Outcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Non-fatal condition noticed during a run.
///
/// Diagnostics are logged as warnings and never change the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The body returned with its context still open; the harness closed it.
    ContextLeftOpen {
        /// The context that was closed
        context: Uuid,
    },
    /// Closing a leftover context failed.
    ContextCloseFailed {
        /// The context that could not be closed
        context: Uuid,
        /// The close error
        reason: String,
    },
    /// Rolling back after a failure or leaked transaction failed.
    RollbackFailed {
        /// The context whose transaction could not be rolled back
        context: Uuid,
        /// The rollback error
        reason: String,
    },
    /// Teardown failed while an earlier failure was already pending.
    TeardownSuppressed {
        /// The teardown error
        reason: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ContextLeftOpen { context } => {
                write!(f, "context {context} was not closed; closed it")
            }
            Diagnostic::ContextCloseFailed { context, reason } => {
                write!(f, "could not close context {context}: {reason}")
            }
            Diagnostic::RollbackFailed { context, reason } => {
                write!(f, "could not roll back context {context}: {reason}")
            }
            Diagnostic::TeardownSuppressed { reason } => {
                write!(f, "teardown failed after an earlier failure: {reason}")
            }
        }
    }
}

/// Everything a runner needs to know about one run.
#[derive(Debug)]
pub struct TestReport {
    /// Name of the test case.
    pub name: String,
    /// What happened.
    pub outcome: Outcome,
    /// Warnings collected along the way.
    pub diagnostics: Vec<Diagnostic>,
}

impl TestReport {
    /// Whether a [`Diagnostic::ContextLeftOpen`] was recorded.
    pub fn left_context_open(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::ContextLeftOpen { .. }))
    }

    /// Hand the outcome to the Rust test runner.
    ///
    /// Returns normally for passed and skipped tests. Panics for failures;
    /// when the body panicked, its original payload is re-raised unchanged.
    pub fn finish(self) {
        match self.outcome {
            Outcome::Passed => {}
            Outcome::Skipped { dialect } => {
                tracing::info!(test = %self.name, %dialect, "Skipped: not applicable to dialect");
            }
            Outcome::Failed(TestFailure::Panicked { payload, .. }) => {
                std::panic::resume_unwind(payload)
            }
            Outcome::Failed(failure) => {
                panic!("{} failed: {}", self.name, error_chain(&failure))
            }
        }
    }
}

/// Render an error followed by its sources.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
