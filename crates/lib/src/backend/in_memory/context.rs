//! Contexts and transactions of the in-memory backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::{Event, Journal, Store};
use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::mapping::MappingPlan;
use crate::backend::{Context, ContextOptions, Transaction};
use crate::entity::EntityClass;

/// Staged writes keyed by (table, id); `None` marks a deletion.
type Overlay = BTreeMap<(String, String), Option<Value>>;

/// Transaction staging writes until commit.
#[derive(Debug)]
pub struct InMemoryTransaction {
    context: Uuid,
    store: Arc<Store>,
    journal: Journal,
    staged: Option<Overlay>,
    closed: bool,
}

impl InMemoryTransaction {
    fn staged(&self, table: &str, id: &str) -> Option<&Option<Value>> {
        self.staged
            .as_ref()?
            .get(&(table.to_string(), id.to_string()))
    }

    fn stage(&mut self, table: &str, id: &str, value: Option<Value>) -> Result<()> {
        let staged = self
            .staged
            .as_mut()
            .ok_or(BackendError::NoActiveTransaction)?;
        staged.insert((table.to_string(), id.to_string()), value);
        Ok(())
    }
}

impl Transaction for InMemoryTransaction {
    fn begin(&mut self) -> Result<()> {
        if self.closed {
            return Err(BackendError::ContextClosed {
                context: self.context,
            }
            .into());
        }
        if self.staged.is_some() {
            return Err(BackendError::TransactionAlreadyActive.into());
        }
        self.staged = Some(Overlay::new());
        self.journal.record(Event::TransactionBegun {
            context: self.context,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or(BackendError::NoActiveTransaction)?;

        let mut tables = self.store.lock();
        // All or nothing: a table dropped underneath us fails the whole commit.
        if let Some(((table, _), _)) = staged.iter().find(|((t, _), _)| !tables.contains_key(t)) {
            return Err(BackendError::MissingTable {
                table: table.clone(),
            }
            .into());
        }
        for ((table, id), value) in staged {
            let Some(rows) = tables.get_mut(&table) else {
                continue;
            };
            match value {
                Some(value) => {
                    rows.insert(id, value);
                }
                None => {
                    rows.remove(&id);
                }
            }
        }
        drop(tables);

        self.journal.record(Event::TransactionCommitted {
            context: self.context,
        });
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.staged
            .take()
            .ok_or(BackendError::NoActiveTransaction)?;
        self.journal.record(Event::TransactionRolledBack {
            context: self.context,
        });
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.staged.is_some()
    }
}

/// Context of the in-memory backend.
#[derive(Debug)]
pub struct InMemoryContext {
    id: Uuid,
    plan: Arc<MappingPlan>,
    options: ContextOptions,
    open: bool,
    transaction: InMemoryTransaction,
}

impl InMemoryContext {
    pub(super) fn open(
        store: Arc<Store>,
        journal: Journal,
        plan: Arc<MappingPlan>,
        options: ContextOptions,
    ) -> Self {
        let id = Uuid::new_v4();
        journal.record(Event::ContextOpened { context: id });
        Self {
            id,
            plan,
            options,
            open: true,
            transaction: InMemoryTransaction {
                context: id,
                store,
                journal,
                staged: None,
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

    /// Table for a write, after checking the context accepts writes.
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
        let table = self.plan.table_for(entity)?;
        if !self.transaction.store.lock().contains_key(table) {
            return Err(BackendError::MissingTable {
                table: table.to_string(),
            }
            .into());
        }
        Ok(table.to_string())
    }
}

impl Context for InMemoryContext {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.transaction.is_active() {
            self.transaction.rollback()?;
        }
        self.open = false;
        self.transaction.closed = true;
        self.transaction.journal.record(Event::ContextClosed { context: self.id });
        Ok(())
    }

    fn transaction(&mut self) -> &mut dyn Transaction {
        &mut self.transaction
    }

    fn persist(&mut self, entity: &EntityClass, id: &str, value: Value) -> Result<()> {
        let table = self.writable_table(entity, "persist")?;
        self.transaction.stage(&table, id, Some(value))
    }

    fn find(&mut self, entity: &EntityClass, id: &str) -> Result<Option<Value>> {
        self.ensure_open()?;
        let table = self.plan.table_for(entity)?;
        if let Some(staged) = self.transaction.staged(table, id) {
            return Ok(staged.clone());
        }
        let tables = self.transaction.store.lock();
        let rows = tables.get(table).ok_or_else(|| BackendError::MissingTable {
            table: table.to_string(),
        })?;
        Ok(rows.get(id).cloned())
    }

    fn remove(&mut self, entity: &EntityClass, id: &str) -> Result<bool> {
        let table = self.writable_table(entity, "remove")?;
        let existed = self.find(entity, id)?.is_some();
        self.transaction.stage(&table, id, None)?;
        Ok(existed)
    }
}
