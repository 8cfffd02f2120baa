//! Lifecycle event log of the in-memory backend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

/// A lifecycle event recorded by the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A factory was created.
    FactoryCreated,
    /// A factory was closed.
    FactoryClosed,
    /// A table was created by schema management.
    TableCreated { table: String },
    /// A table was dropped by schema management.
    TableDropped { table: String },
    /// A context was opened.
    ContextOpened { context: Uuid },
    /// A context was closed.
    ContextClosed { context: Uuid },
    /// A transaction began.
    TransactionBegun { context: Uuid },
    /// A transaction committed.
    TransactionCommitted { context: Uuid },
    /// A transaction rolled back.
    TransactionRolledBack { context: Uuid },
}

/// Shared, append-only record of [`Event`]s.
///
/// Cloning the journal shares the underlying log, so a test can keep a handle
/// while the provider is owned by the harness.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: Event) {
        tracing::trace!(?event, "in-memory backend event");
        self.lock().push(event);
    }

    /// Snapshot of all events in order.
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Number of factories created.
    pub fn factories_created(&self) -> usize {
        self.count(|e| matches!(e, Event::FactoryCreated))
    }

    /// Number of factories closed.
    pub fn factories_closed(&self) -> usize {
        self.count(|e| matches!(e, Event::FactoryClosed))
    }

    /// Number of contexts opened.
    pub fn contexts_opened(&self) -> usize {
        self.count(|e| matches!(e, Event::ContextOpened { .. }))
    }

    /// Number of contexts closed.
    pub fn contexts_closed(&self) -> usize {
        self.count(|e| matches!(e, Event::ContextClosed { .. }))
    }

    /// Number of rollbacks.
    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::TransactionRolledBack { .. }))
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    // A body that panicked mid-operation may poison the lock; the log is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
