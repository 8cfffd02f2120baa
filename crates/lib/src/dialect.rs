//! Database dialect identifiers.
//!
//! Tests use the dialect to declare themselves inapplicable to some databases.
//! The dialect normally comes from the backend, but `TEST_DIALECT` can override
//! it so a suite can be dry-run against the skip rules of another database.

use std::fmt;
use std::str::FromStr;

use crate::constants::DIALECT_ENV;

/// Identifier of database-specific SQL behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// The in-memory reference backend.
    InMemory,
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// Any other dialect, stored lowercased.
    Other(String),
}

impl Dialect {
    /// Read the dialect override from `TEST_DIALECT`, if set and non-empty.
    pub fn from_env() -> Option<Self> {
        match std::env::var(DIALECT_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse().ok(),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &str {
        match self {
            Dialect::InMemory => "inmemory",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Other(name) => name,
        }
    }

    /// Whether this dialect talks to a SQL database.
    pub fn is_sql(&self) -> bool {
        matches!(self, Dialect::Sqlite | Dialect::Postgres)
    }
}

impl FromStr for Dialect {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "inmemory" | "in-memory" | "memory" => Dialect::InMemory,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            "postgres" | "postgresql" | "pg" => Dialect::Postgres,
            _ => Dialect::Other(normalized),
        })
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
