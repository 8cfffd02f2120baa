//! SQL-based persistence backend.
//!
//! Stores each mapped entity as a `(id TEXT, data TEXT)` table through sqlx's
//! `AnyPool`, supporting both SQLite and PostgreSQL:
//!
//! - **SQLite** (feature: `sqlite`): file or in-memory database
//! - **PostgreSQL** (feature: `postgres`): server database
//!
//! The harness is synchronous, so the provider owns a tokio runtime and every
//! database call is driven with `block_on`. Providers must therefore be used
//! from plain threads (e.g. `#[test]` functions), not from inside an async
//! runtime.

mod context;
mod schema;

use std::sync::Arc;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tokio::runtime::Runtime;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::mapping::MappingPlan;
use crate::backend::{Context, ContextOptions, Factory, Provider};
use crate::config::ConfigMap;
use crate::dialect::Dialect;
use crate::entity::EntityClass;

pub use context::{SqlxContext, SqlxTransaction};

/// Extension trait for sqlx Result types to simplify error handling.
///
/// Similar to `anyhow::Context`, this trait adds a method to convert
/// sqlx errors to `BackendError::SqlxError` with a context message.
pub(crate) trait SqlxResultExt<T> {
    /// Convert sqlx error to BackendError with context message.
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            BackendError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// sqlx [`Provider`]. Each factory gets its own connection pool.
pub struct SqlxProvider {
    url: String,
    dialect: Dialect,
    runtime: Arc<Runtime>,
}

impl SqlxProvider {
    /// Provider for a connection URL; the dialect is taken from the URL scheme.
    pub fn connect(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let dialect = if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Dialect::Postgres
        } else {
            Dialect::Sqlite
        };
        let runtime = Runtime::new().map_err(|e| BackendError::Runtime {
            reason: format!("Failed to create tokio runtime: {e}"),
        })?;
        Ok(Self {
            url,
            dialect,
            runtime: Arc::new(runtime),
        })
    }

    /// The connection URL this provider connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains("mode=memory")
    }
}

#[cfg(feature = "sqlite")]
impl SqlxProvider {
    /// Provider for a SQLite database file, created if missing.
    pub fn sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        // mode=rwc: read-write-create (create file if it doesn't exist)
        Self::connect(format!("sqlite:{}?mode=rwc", path.as_ref().display()))
    }

    /// Provider for a private in-memory SQLite database.
    ///
    /// Uses a unique shared-cache name so all connections of a pool see the
    /// same database while separate providers stay isolated.
    pub fn sqlite_in_memory() -> Result<Self> {
        let unique_id = uuid::Uuid::new_v4();
        Self::connect(format!(
            "sqlite:file:mem_{unique_id}?mode=memory&cache=shared"
        ))
    }
}

impl Provider for SqlxProvider {
    fn create_factory(&self, config: &ConfigMap) -> Result<Box<dyn Factory>> {
        // Install any driver support
        sqlx::any::install_default_drivers();

        let plan = MappingPlan::from_config(config)?;

        // The last connection to an in-memory SQLite database destroys it,
        // so keep one alive for the lifetime of the pool.
        let options = if self.is_in_memory() {
            AnyPoolOptions::new()
                .max_connections(5)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(5)
        };
        let pool = self
            .runtime
            .block_on(options.connect(&self.url))
            .sql_context("Failed to connect")?;

        if plan.schema().creates()
            && let Err(e) = self.runtime.block_on(schema::create_tables(&pool, &plan))
        {
            self.runtime.block_on(pool.close());
            return Err(e);
        }

        plan.log_mapping();
        tracing::debug!(
            dialect = %self.dialect,
            classes = plan.classes().len(),
            schema = ?plan.schema(),
            "Created SQL factory"
        );
        Ok(Box::new(SqlxFactory {
            runtime: Arc::clone(&self.runtime),
            pool,
            plan: Arc::new(plan),
            dialect: self.dialect.clone(),
            open: true,
        }))
    }

    fn dialect(&self) -> Dialect {
        self.dialect.clone()
    }
}

/// Factory of the sqlx backend, owning one connection pool.
pub struct SqlxFactory {
    runtime: Arc<Runtime>,
    pool: AnyPool,
    plan: Arc<MappingPlan>,
    dialect: Dialect,
    open: bool,
}

impl SqlxFactory {
    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

impl Factory for SqlxFactory {
    fn create_context_with(&self, options: &ContextOptions) -> Result<Box<dyn Context>> {
        if !self.open {
            return Err(BackendError::FactoryClosed.into());
        }
        Ok(Box::new(SqlxContext::open(
            Arc::clone(&self.runtime),
            self.pool.clone(),
            Arc::clone(&self.plan),
            self.dialect.clone(),
            options.clone(),
        )))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(BackendError::FactoryClosed.into());
        }
        self.open = false;

        let dropped = if self.plan.schema().drops() {
            self.runtime
                .block_on(schema::drop_tables(&self.pool, &self.plan))
        } else {
            Ok(())
        };
        self.runtime.block_on(self.pool.close());
        dropped
    }

    fn mapped_classes(&self) -> Vec<EntityClass> {
        self.plan.classes()
    }
}
