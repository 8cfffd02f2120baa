//! Table creation and removal for mapped entities.
//!
//! Every entity table has the same portable shape, so no dialect switch is
//! needed here: `TEXT` and `DROP TABLE IF EXISTS` work on SQLite and PostgreSQL.

use sqlx::AnyPool;

use super::SqlxResultExt;
use crate::Result;
use crate::backend::mapping::MappingPlan;

/// (Re)create the table of every mapped class.
pub(super) async fn create_tables(pool: &AnyPool, plan: &MappingPlan) -> Result<()> {
    for table in plan.tables() {
        let statement = format!("DROP TABLE IF EXISTS {table}");
        sqlx::query(&statement)
            .execute(pool)
            .await
            .sql_context(&format!("Failed to drop stale table {table}"))?;

        let create = format!(
            "CREATE TABLE {table} (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL
            )"
        );
        sqlx::query(&create)
            .execute(pool)
            .await
            .sql_context(&format!("Failed to create table {table}"))?;
        tracing::debug!(table, "Created entity table");
    }
    Ok(())
}

/// Drop the table of every mapped class.
pub(super) async fn drop_tables(pool: &AnyPool, plan: &MappingPlan) -> Result<()> {
    for table in plan.tables() {
        let statement = format!("DROP TABLE IF EXISTS {table}");
        sqlx::query(&statement)
            .execute(pool)
            .await
            .sql_context(&format!("Failed to drop table {table}"))?;
        tracing::debug!(table, "Dropped entity table");
    }
    Ok(())
}
