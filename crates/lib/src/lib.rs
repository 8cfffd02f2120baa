//!
//! Persistence Testbed: lifecycle scaffolding for database-backed tests.
//! This library runs a test body against a freshly configured persistence factory and keeps
//! the database state of one test from leaking into the next.
//!
//! ## Core Concepts
//!
//! * **Test cases (`harness::TestCase`)**: The extension points a test supplies: the entity
//!   classes to map, optional cache regions and legacy descriptors, and which dialects it
//!   applies to. `harness::CaseSpec` builds one from plain values.
//! * **Configuration (`config::build_config`)**: Merges the ambient properties file with the
//!   test's hooks into a `config::ConfigMap`, always forcing create-drop schema handling.
//! * **Backends (`backend::Provider`)**: A pluggable persistence layer. A provider creates a
//!   `backend::Factory` per test; the factory hands out `backend::Context` handles, each with
//!   at most one `backend::Transaction`.
//! * **Harness (`harness::Harness`)**: Drives the lifecycle. It skips inapplicable dialects,
//!   builds the factory, opens a context for the body, rolls back leaked transactions, closes
//!   leftover contexts and always releases the factory.
//!
//! The in-memory backend is always available. The sqlx backend is enabled by the `sqlite`
//! (default) and `postgres` features.

pub mod backend;
pub mod config;
pub mod constants;
pub mod dialect;
pub mod entity;
pub mod harness;

pub use dialect::Dialect;
pub use entity::EntityClass;
pub use harness::{
    BodyResult, BoxError, CaseSpec, Diagnostic, Harness, HarnessSettings, Outcome, Phase,
    Session, TestCase, TestFailure, TestReport,
};

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured configuration errors from the config module
    #[error(transparent)]
    Config(config::ConfigError),

    /// Structured persistence errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Backend(_) => "backend",
        }
    }

    /// Check if this error is configuration-related.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this error is backend-related.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Config(config_err) => config_err.is_io_error(),
            _ => false,
        }
    }

    /// Check if this error comes from using a closed factory or context.
    pub fn is_closed(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_closed(),
            _ => false,
        }
    }

    /// Check if this error is about transaction state.
    pub fn is_transaction_error(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_transaction_error(),
            _ => false,
        }
    }

    /// Check if this error comes from an invalid entity mapping.
    pub fn is_mapping_error(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_mapping_error(),
            _ => false,
        }
    }
}
