//! In-memory persistence backend.
//!
//! This module provides an in-memory implementation of the backend traits,
//! suitable for exercising the harness without a database. Tables are plain
//! maps from document id to JSON value; transactions stage writes in an overlay
//! that is applied on commit and discarded on rollback.
//!
//! Every lifecycle step is recorded in a shared [`Journal`], which tests use to
//! check that factories, contexts and transactions were cleaned up.

mod context;
mod journal;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::mapping::MappingPlan;
use crate::backend::{Context, ContextOptions, Factory, Provider};
use crate::config::ConfigMap;
use crate::dialect::Dialect;
use crate::entity::EntityClass;

pub use context::{InMemoryContext, InMemoryTransaction};
pub use journal::{Event, Journal};

/// Documents of one table keyed by id.
pub(crate) type Table = BTreeMap<String, Value>;

/// Tables shared by every factory and context of one provider.
#[derive(Debug, Default)]
pub(crate) struct Store {
    tables: Mutex<HashMap<String, Table>>,
}

impl Store {
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<String, Table>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory [`Provider`].
///
/// Cloning shares the store and journal, so a test can hold a clone for
/// inspection while the harness owns the original.
#[derive(Debug, Clone)]
pub struct InMemory {
    store: Arc<Store>,
    journal: Journal,
    dialect: Dialect,
}

impl InMemory {
    /// Creates a new, empty `InMemory` provider reporting [`Dialect::InMemory`].
    pub fn new() -> Self {
        Self {
            store: Arc::new(Store::default()),
            journal: Journal::new(),
            dialect: Dialect::InMemory,
        }
    }

    /// Report a different dialect, to exercise dialect-specific skips.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Handle to the shared event journal.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Names of the tables currently present, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of committed documents in `table`, or `None` if it does not exist.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.store.lock().get(table).map(BTreeMap::len)
    }
}

impl Default for InMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for InMemory {
    fn create_factory(&self, config: &ConfigMap) -> Result<Box<dyn Factory>> {
        let plan = MappingPlan::from_config(config)?;

        if plan.schema().creates() {
            let mut tables = self.store.lock();
            for table in plan.tables() {
                tables.insert(table.to_string(), Table::new());
                self.journal.record(Event::TableCreated {
                    table: table.to_string(),
                });
            }
        }

        plan.log_mapping();
        tracing::debug!(
            classes = plan.classes().len(),
            schema = ?plan.schema(),
            "Created in-memory factory"
        );
        self.journal.record(Event::FactoryCreated);
        Ok(Box::new(InMemoryFactory {
            store: Arc::clone(&self.store),
            journal: self.journal.clone(),
            plan: Arc::new(plan),
            open: true,
        }))
    }

    fn dialect(&self) -> Dialect {
        self.dialect.clone()
    }
}

/// Factory of the in-memory backend.
#[derive(Debug)]
pub struct InMemoryFactory {
    store: Arc<Store>,
    journal: Journal,
    plan: Arc<MappingPlan>,
    open: bool,
}

impl InMemoryFactory {
    /// The compiled mapping metadata.
    pub fn plan(&self) -> &MappingPlan {
        &self.plan
    }
}

impl Factory for InMemoryFactory {
    fn create_context_with(&self, options: &ContextOptions) -> Result<Box<dyn Context>> {
        if !self.open {
            return Err(BackendError::FactoryClosed.into());
        }
        let context = InMemoryContext::open(
            Arc::clone(&self.store),
            self.journal.clone(),
            Arc::clone(&self.plan),
            options.clone(),
        );
        Ok(Box::new(context))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(BackendError::FactoryClosed.into());
        }
        self.open = false;

        if self.plan.schema().drops() {
            let mut tables = self.store.lock();
            for table in self.plan.tables() {
                tables.remove(table);
                self.journal.record(Event::TableDropped {
                    table: table.to_string(),
                });
            }
        }

        self.journal.record(Event::FactoryClosed);
        Ok(())
    }

    fn mapped_classes(&self) -> Vec<EntityClass> {
        self.plan.classes()
    }
}
