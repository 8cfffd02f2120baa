//! Backend error types.
//!
//! Structured errors for factory, context and transaction operations of the
//! reference backends. Other backends are free to reuse them.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during backend operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// The factory was already closed.
    #[error("Factory is closed")]
    FactoryClosed,

    /// The context was already closed.
    #[error("Context {context} is closed")]
    ContextClosed {
        /// The closed context
        context: Uuid,
    },

    /// `begin` called while a transaction is active.
    #[error("Transaction already active")]
    TransactionAlreadyActive,

    /// `commit` or `rollback` called without an active transaction.
    #[error("No active transaction")]
    NoActiveTransaction,

    /// A write was attempted outside a transaction.
    #[error("{operation} requires an active transaction")]
    TransactionRequired {
        /// The operation that was attempted
        operation: String,
    },

    /// A write was attempted on a read-only context.
    #[error("Context {context} is read-only")]
    ReadOnlyContext {
        /// The read-only context
        context: Uuid,
    },

    /// The entity class is not among the mapped classes.
    #[error("Entity {entity} is not mapped")]
    UnmappedEntity {
        /// Fully-qualified name of the entity class
        entity: String,
    },

    /// A cache setting names a class or collection owner that is not mapped.
    #[error("Cache setting {key} references an unmapped class")]
    UnknownCacheTarget {
        /// The offending setting key
        key: String,
    },

    /// Two mapped classes resolve to the same table.
    #[error("Table {table} is mapped by both {first} and {second}")]
    TableConflict {
        /// The shared table name
        table: String,
        /// The first class mapped to it
        first: String,
        /// The second class mapped to it
        second: String,
    },

    /// The table for a mapped entity does not exist in the store.
    #[error("Table {table} does not exist")]
    MissingTable {
        /// The missing table name
        table: String,
    },

    /// A document could not be encoded or decoded.
    #[error("Document serialization failed")]
    Serialization {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// SQLx database error.
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("SQL error: {reason}")]
    SqlxError {
        /// Description of the SQL error
        reason: String,
        /// The underlying sqlx error
        #[source]
        source: Option<sqlx::Error>,
    },

    /// The async runtime backing a blocking backend could not be created.
    #[error("Runtime error: {reason}")]
    Runtime {
        /// Description of the runtime failure
        reason: String,
    },
}

impl BackendError {
    /// Check if this error comes from using a closed factory or context.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            BackendError::FactoryClosed | BackendError::ContextClosed { .. }
        )
    }

    /// Check if this error is about transaction demarcation.
    pub fn is_transaction_error(&self) -> bool {
        matches!(
            self,
            BackendError::TransactionAlreadyActive
                | BackendError::NoActiveTransaction
                | BackendError::TransactionRequired { .. }
        )
    }

    /// Check if this error comes from an inconsistent mapping configuration.
    pub fn is_mapping_error(&self) -> bool {
        matches!(
            self,
            BackendError::UnmappedEntity { .. }
                | BackendError::UnknownCacheTarget { .. }
                | BackendError::TableConflict { .. }
                | BackendError::MissingTable { .. }
        )
    }
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
