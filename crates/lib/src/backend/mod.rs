//! Persistence backend contract.
//!
//! The harness never talks to a database directly. It consumes a [`Provider`]
//! that turns a [`ConfigMap`] into a [`Factory`], and the factory hands out
//! short-lived [`Context`] handles, each tracking at most one [`Transaction`].
//!
//! Two reference implementations ship with the crate:
//!
//! * [`in_memory::InMemory`]: document tables held in memory, with a
//!   [`in_memory::Journal`] of lifecycle events for inspection.
//! * `sql::SqlxProvider` (features `sqlite` / `postgres`): the same document
//!   tables on top of sqlx.
//!
//! Both map every loaded entity class to one table keyed by string id with a
//! JSON document body. Richer mapping is the business of real persistence
//! frameworks plugged in through these traits.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::Result;
use crate::config::ConfigMap;
use crate::constants::CONTEXT_READ_ONLY;
use crate::dialect::Dialect;
use crate::entity::EntityClass;

mod errors;
pub mod in_memory;
pub mod mapping;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use errors::BackendError;
pub use mapping::{MappingPlan, SchemaAction};

/// Creates persistence factories from a configuration.
///
/// A provider is long-lived and may create many factories, one per test.
pub trait Provider: Send {
    /// Create a factory from the configuration.
    ///
    /// Errors here are fatal setup failures for the test being run.
    fn create_factory(&self, config: &ConfigMap) -> Result<Box<dyn Factory>>;

    /// The dialect of the database behind this provider.
    fn dialect(&self) -> Dialect;
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn create_factory(&self, config: &ConfigMap) -> Result<Box<dyn Factory>> {
        (**self).create_factory(config)
    }

    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }
}

/// Owns connections and compiled mapping metadata for the duration of one test.
pub trait Factory: Send {
    /// Open a context with default settings.
    fn create_context(&self) -> Result<Box<dyn Context>> {
        self.create_context_with(&ContextOptions::default())
    }

    /// Open a context with the given overrides.
    fn create_context_with(&self, options: &ContextOptions) -> Result<Box<dyn Context>>;

    /// Whether [`Factory::close`] has not been called yet.
    fn is_open(&self) -> bool;

    /// Release the factory and everything it owns.
    ///
    /// Closing an already closed factory returns [`BackendError::FactoryClosed`].
    fn close(&mut self) -> Result<()>;

    /// Entity classes this factory maps.
    fn mapped_classes(&self) -> Vec<EntityClass>;
}

/// A unit-of-work handle.
pub trait Context: Send {
    /// Identifier used in logs and diagnostics.
    fn id(&self) -> Uuid;

    /// Whether [`Context::close`] has not been called yet.
    fn is_open(&self) -> bool;

    /// Close the context, rolling back an active transaction.
    fn close(&mut self) -> Result<()>;

    /// The context's transaction.
    ///
    /// Inactive once the context is closed; `begin` then fails with
    /// [`BackendError::ContextClosed`].
    fn transaction(&mut self) -> &mut dyn Transaction;

    /// Store `value` under `id`, replacing any existing document.
    ///
    /// Requires an active transaction.
    fn persist(&mut self, entity: &EntityClass, id: &str, value: Value) -> Result<()>;

    /// Load the document stored under `id`, seeing uncommitted writes of the
    /// active transaction.
    fn find(&mut self, entity: &EntityClass, id: &str) -> Result<Option<Value>>;

    /// Delete the document stored under `id`. Returns whether one existed.
    ///
    /// Requires an active transaction.
    fn remove(&mut self, entity: &EntityClass, id: &str) -> Result<bool>;
}

/// Resource-local transaction of a [`Context`].
pub trait Transaction: Send {
    /// Start a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Make the transaction's writes durable.
    fn commit(&mut self) -> Result<()>;

    /// Discard the transaction's writes.
    fn rollback(&mut self) -> Result<()>;

    /// Whether a transaction has begun and not yet ended.
    fn is_active(&self) -> bool;
}

/// Per-context setting overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    settings: BTreeMap<String, String>,
}

impl ContextOptions {
    /// Options with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a setting.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Shorthand for a read-only context.
    pub fn read_only() -> Self {
        Self::new().with(CONTEXT_READ_ONLY, "true")
    }

    /// Look up a setting.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Whether the context rejects writes.
    pub fn is_read_only(&self) -> bool {
        self.get(CONTEXT_READ_ONLY)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}
