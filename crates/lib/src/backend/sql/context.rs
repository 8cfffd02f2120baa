//! Contexts and transactions of the sqlx backend.

use std::sync::Arc;

use serde_json::Value;
use sqlx::AnyPool;
use tokio::runtime::Runtime;
use uuid::Uuid;

use super::SqlxResultExt;
use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::mapping::MappingPlan;
use crate::backend::{Context, ContextOptions, Transaction};
use crate::dialect::Dialect;
use crate::entity::EntityClass;

/// Transaction holding a pooled connection between `begin` and `commit`/`rollback`.
///
/// Dropping it with a transaction still active rolls the transaction back on
/// the provider's runtime.
pub struct SqlxTransaction {
    context: Uuid,
    runtime: Arc<Runtime>,
    pool: AnyPool,
    tx: Option<sqlx::Transaction<'static, sqlx::Any>>,
    closed: bool,
}

impl Transaction for SqlxTransaction {
    fn begin(&mut self) -> Result<()> {
        if self.closed {
            return Err(BackendError::ContextClosed {
                context: self.context,
            }
            .into());
        }
        if self.tx.is_some() {
            return Err(BackendError::TransactionAlreadyActive.into());
        }
        let tx = self
            .runtime
            .block_on(self.pool.begin())
            .sql_context("Failed to begin transaction")?;
        self.tx = Some(tx);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(BackendError::NoActiveTransaction)?;
        self.runtime
            .block_on(tx.commit())
            .sql_context("Failed to commit transaction")
    }

    fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(BackendError::NoActiveTransaction)?;
        self.runtime
            .block_on(tx.rollback())
            .sql_context("Failed to roll back transaction")
    }

    fn is_active(&self) -> bool {
        self.tx.is_some()
    }
}

impl Drop for SqlxTransaction {
    fn drop(&mut self) {
        // The pooled connection must be released inside the runtime.
        if let Some(tx) = self.tx.take()
            && let Err(e) = self.runtime.block_on(tx.rollback())
        {
            tracing::warn!(
                context = %self.context,
                error = %e,
                "Rollback of dropped transaction failed"
            );
        }
    }
}

/// Context of the sqlx backend.
pub struct SqlxContext {
    id: Uuid,
    plan: Arc<MappingPlan>,
    dialect: Dialect,
    options: ContextOptions,
    open: bool,
    transaction: SqlxTransaction,
}

impl SqlxContext {
    pub(super) fn open(
        runtime: Arc<Runtime>,
        pool: AnyPool,
        plan: Arc<MappingPlan>,
        dialect: Dialect,
        options: ContextOptions,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::trace!(context = %id, "Opened SQL context");
        Self {
            id,
            plan,
            dialect,
            options,
            open: true,
            transaction: SqlxTransaction {
                context: id,
                runtime,
                pool,
                tx: None,
                closed: false,
            },
        }
    }

    /// The options this context was opened with.
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(BackendError::ContextClosed { context: self.id }.into())
        }
    }

    fn writable_table(&self, entity: &EntityClass, operation: &str) -> Result<String> {
        self.ensure_open()?;
        if self.options.is_read_only() {
            return Err(BackendError::ReadOnlyContext { context: self.id }.into());
        }
        if !self.transaction.is_active() {
            return Err(BackendError::TransactionRequired {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(self.plan.table_for(entity)?.to_string())
    }

    fn upsert_sql(&self, table: &str) -> String {
        if self.dialect == Dialect::Postgres {
            format!(
                "INSERT INTO {table} (id, data) VALUES ($1, $2)
                 ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data"
            )
        } else {
            format!("INSERT OR REPLACE INTO {table} (id, data) VALUES ($1, $2)")
        }
    }
}

impl Context for SqlxContext {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        self.transaction.closed = true;
        if self.transaction.is_active() {
            self.transaction.rollback()?;
        }
        tracing::trace!(context = %self.id, "Closed SQL context");
        Ok(())
    }

    fn transaction(&mut self) -> &mut dyn Transaction {
        &mut self.transaction
    }

    fn persist(&mut self, entity: &EntityClass, id: &str, value: Value) -> Result<()> {
        let table = self.writable_table(entity, "persist")?;
        let data = serde_json::to_string(&value)
            .map_err(|source| BackendError::Serialization { source })?;
        let sql = self.upsert_sql(&table);

        let transaction = &mut self.transaction;
        let tx = transaction
            .tx
            .as_mut()
            .ok_or(BackendError::NoActiveTransaction)?;
        transaction
            .runtime
            .block_on(sqlx::query(&sql).bind(id).bind(data).execute(&mut **tx))
            .sql_context(&format!("Failed to persist into {table}"))?;
        Ok(())
    }

    fn find(&mut self, entity: &EntityClass, id: &str) -> Result<Option<Value>> {
        self.ensure_open()?;
        let table = self.plan.table_for(entity)?.to_string();
        let sql = format!("SELECT data FROM {table} WHERE id = $1");
        let query = sqlx::query_scalar::<sqlx::Any, String>(&sql).bind(id);

        let transaction = &mut self.transaction;
        let data = match transaction.tx.as_mut() {
            Some(tx) => transaction
                .runtime
                .block_on(query.fetch_optional(&mut **tx)),
            None => transaction
                .runtime
                .block_on(query.fetch_optional(&transaction.pool)),
        }
        .sql_context(&format!("Failed to load from {table}"))?;

        data.map(|data| {
            serde_json::from_str(&data)
                .map_err(|source| crate::Error::from(BackendError::Serialization { source }))
        })
        .transpose()
    }

    fn remove(&mut self, entity: &EntityClass, id: &str) -> Result<bool> {
        let table = self.writable_table(entity, "remove")?;
        let sql = format!("DELETE FROM {table} WHERE id = $1");

        let transaction = &mut self.transaction;
        let tx = transaction
            .tx
            .as_mut()
            .ok_or(BackendError::NoActiveTransaction)?;
        let result = transaction
            .runtime
            .block_on(sqlx::query(&sql).bind(id).execute(&mut **tx))
            .sql_context(&format!("Failed to delete from {table}"))?;
        Ok(result.rows_affected() > 0)
    }
}
