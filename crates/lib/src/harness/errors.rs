//! Test failure causes reported by the harness.

use std::any::Any;

use thiserror::Error;

/// Error type test bodies return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type of a test body.
pub type BodyResult = std::result::Result<(), BoxError>;

/// Why a test failed.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TestFailure {
    /// Building the configuration or creating the factory failed.
    #[error("Test setup failed")]
    Setup {
        /// The underlying error
        #[source]
        source: crate::Error,
    },

    /// No context could be obtained before running the body.
    #[error("Could not obtain a persistence context")]
    ContextUnavailable {
        /// The underlying error
        #[source]
        source: crate::Error,
    },

    /// The body returned normally but left its transaction active.
    #[error("You left an open transaction! Fix your test case. It was rolled back for you.")]
    LeakedTransaction,

    /// The body returned an error.
    #[error(transparent)]
    Body(BoxError),

    /// The body panicked.
    #[error("Test body panicked: {message}")]
    Panicked {
        /// Panic message, if the payload was a string
        message: String,
        /// The original payload, for re-raising
        payload: Box<dyn Any + Send>,
    },

    /// Releasing the factory failed and nothing else had failed before.
    #[error("Test teardown failed")]
    Teardown {
        /// The underlying error
        #[source]
        source: crate::Error,
    },
}

impl TestFailure {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TestFailure::Panicked { message, payload }
    }

    /// Check if this failure is a leaked transaction.
    pub fn is_leaked_transaction(&self) -> bool {
        matches!(self, TestFailure::LeakedTransaction)
    }

    /// Check if the failure happened before the body ran.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            TestFailure::Setup { .. } | TestFailure::ContextUnavailable { .. }
        )
    }

    /// Check if the failure was raised by the test body itself.
    pub fn is_body_failure(&self) -> bool {
        matches!(self, TestFailure::Body(_) | TestFailure::Panicked { .. })
    }

    /// The body's error, if the body returned one.
    pub fn body_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TestFailure::Body(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// The harness error behind a setup, context or teardown failure.
    pub fn harness_error(&self) -> Option<&crate::Error> {
        match self {
            TestFailure::Setup { source }
            | TestFailure::ContextUnavailable { source }
            | TestFailure::Teardown { source } => Some(source),
            _ => None,
        }
    }
}
