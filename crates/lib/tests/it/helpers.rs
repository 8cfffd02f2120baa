use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use persistence_testbed::{
    CaseSpec, Dialect, EntityClass, Harness, HarnessSettings, TestCase,
    backend::{BackendError, Context, ContextOptions, Factory, Provider, Transaction},
    backend::in_memory::InMemory,
    config::ConfigMap,
};
use serde_json::Value;
use uuid::Uuid;

// ==========================
// CORE TEST FACTORIES
// ==========================

/// Creates a test provider based on TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory provider (default)
/// - "sqlite": SQLite in-memory database (requires `sqlite` feature)
/// - "postgres": PostgreSQL database (requires `postgres` feature and TEST_POSTGRES_URL)
///
/// Postgres runs share one database, so run them with `--test-threads=1`.
///
/// # Panics
/// Panics if the selected backend's feature is not enabled.
pub fn test_provider() -> Box<dyn Provider> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use persistence_testbed::backend::sql::SqlxProvider;
                Box::new(SqlxProvider::sqlite_in_memory().expect("Failed to create SQLite provider"))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("postgres") => {
            #[cfg(feature = "postgres")]
            {
                use persistence_testbed::backend::sql::SqlxProvider;
                let url = std::env::var("TEST_POSTGRES_URL")
                    .unwrap_or_else(|_| "postgres://localhost/testbed_test".to_string());
                Box::new(SqlxProvider::connect(url).expect("Failed to create PostgreSQL provider"))
            }
            #[cfg(not(feature = "postgres"))]
            {
                panic!("TEST_BACKEND=postgres requires the 'postgres' feature to be enabled")
            }
        }
        _ => Box::new(InMemory::new()),
    }
}

/// Settings that ignore the environment and point at a properties file that does not exist.
pub fn isolated_settings() -> HarnessSettings {
    HarnessSettings::default().with_properties_path("no-such-dir/persistence.properties")
}

/// Entity used by most tests.
pub fn book() -> EntityClass {
    EntityClass::named("library::Book")
}

/// Second entity used by most tests.
pub fn author() -> EntityClass {
    EntityClass::named("library::Author")
}

/// A case mapping [`book`] and [`author`].
pub fn library_case() -> CaseSpec {
    CaseSpec::new("library").with_classes([book(), author()])
}

/// Harness for `case` against `provider`, isolated from the environment.
pub fn harness_for<C: TestCase>(case: C, provider: impl Provider + 'static) -> Harness<C> {
    Harness::with_settings(case, provider, isolated_settings())
}

// ==========================
// FAULT INJECTION
// ==========================

/// Which backend operations fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub create_context: bool,
    pub rollback: bool,
    pub close_context: bool,
    pub close_factory: bool,
}

/// Scripted provider whose operations fail on demand and are logged by name.
#[derive(Debug, Clone, Default)]
pub struct FaultyProvider {
    faults: Faults,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl FaultyProvider {
    pub fn new(faults: Faults) -> Self {
        Self {
            faults,
            calls: Arc::default(),
        }
    }

    /// Number of recorded calls named `call`.
    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == call)
            .count()
    }
}

fn log(calls: &Arc<Mutex<Vec<&'static str>>>, call: &'static str) {
    calls.lock().unwrap().push(call);
}

fn injected(operation: &str) -> persistence_testbed::Error {
    BackendError::Runtime {
        reason: format!("injected {operation} failure"),
    }
    .into()
}

impl Provider for FaultyProvider {
    fn create_factory(&self, _config: &ConfigMap) -> persistence_testbed::Result<Box<dyn Factory>> {
        log(&self.calls, "create_factory");
        Ok(Box::new(FaultyFactory {
            faults: self.faults,
            calls: Arc::clone(&self.calls),
            open: true,
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Other("faulty".to_string())
    }
}

struct FaultyFactory {
    faults: Faults,
    calls: Arc<Mutex<Vec<&'static str>>>,
    open: bool,
}

impl Factory for FaultyFactory {
    fn create_context_with(
        &self,
        _options: &ContextOptions,
    ) -> persistence_testbed::Result<Box<dyn Context>> {
        log(&self.calls, "create_context");
        if self.faults.create_context {
            return Err(injected("create_context"));
        }
        Ok(Box::new(FaultyContext {
            id: Uuid::new_v4(),
            faults: self.faults,
            calls: Arc::clone(&self.calls),
            open: true,
            transaction: FaultyTransaction {
                faults: self.faults,
                calls: Arc::clone(&self.calls),
                active: false,
            },
            rows: HashMap::new(),
        }))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> persistence_testbed::Result<()> {
        log(&self.calls, "close_factory");
        self.open = false;
        if self.faults.close_factory {
            return Err(injected("close_factory"));
        }
        Ok(())
    }

    fn mapped_classes(&self) -> Vec<EntityClass> {
        Vec::new()
    }
}

struct FaultyTransaction {
    faults: Faults,
    calls: Arc<Mutex<Vec<&'static str>>>,
    active: bool,
}

impl Transaction for FaultyTransaction {
    fn begin(&mut self) -> persistence_testbed::Result<()> {
        log(&self.calls, "begin");
        self.active = true;
        Ok(())
    }

    fn commit(&mut self) -> persistence_testbed::Result<()> {
        log(&self.calls, "commit");
        self.active = false;
        Ok(())
    }

    fn rollback(&mut self) -> persistence_testbed::Result<()> {
        log(&self.calls, "rollback");
        if self.faults.rollback {
            return Err(injected("rollback"));
        }
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

struct FaultyContext {
    id: Uuid,
    faults: Faults,
    calls: Arc<Mutex<Vec<&'static str>>>,
    open: bool,
    transaction: FaultyTransaction,
    rows: HashMap<String, Value>,
}

impl Context for FaultyContext {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> persistence_testbed::Result<()> {
        log(&self.calls, "close_context");
        if self.faults.close_context {
            return Err(injected("close_context"));
        }
        self.open = false;
        self.transaction.active = false;
        Ok(())
    }

    fn transaction(&mut self) -> &mut dyn Transaction {
        &mut self.transaction
    }

    fn persist(
        &mut self,
        _entity: &EntityClass,
        id: &str,
        value: Value,
    ) -> persistence_testbed::Result<()> {
        self.rows.insert(id.to_string(), value);
        Ok(())
    }

    fn find(
        &mut self,
        _entity: &EntityClass,
        id: &str,
    ) -> persistence_testbed::Result<Option<Value>> {
        Ok(self.rows.get(id).cloned())
    }

    fn remove(&mut self, _entity: &EntityClass, id: &str) -> persistence_testbed::Result<bool> {
        Ok(self.rows.remove(id).is_some())
    }
}
