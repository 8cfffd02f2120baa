//! Lifecycle driver for database-backed tests.
//!
//! A [`Harness`] runs one test body at a time through a strictly sequential
//! lifecycle:
//!
//! ```text
//! NotStarted -> Skipped
//!            -> SettingUp -> Running -> TearingDown -> Finished
//! ```
//!
//! * The dialect check comes first; an inapplicable test never touches the backend.
//! * Setup builds the [`ConfigMap`](crate::config::ConfigMap) and creates the factory.
//! * The body runs inside a guard that opens a context for it, rolls back any
//!   transaction it leaves active (failing the test if the body otherwise
//!   succeeded), and closes any context it leaves open (with a warning).
//! * Teardown closes the factory exactly once, whatever happened before.
//!
//! ```
//! use persistence_testbed::{CaseSpec, EntityClass, Harness};
//! use persistence_testbed::backend::in_memory::InMemory;
//! use serde_json::json;
//!
//! let book = EntityClass::named("library::Book");
//! let case = CaseSpec::new("stores_a_book").with_class(book.clone());
//!
//! let report = Harness::new(case, InMemory::new()).run(|session| {
//!     let ctx = session.get_or_create_context()?;
//!     ctx.transaction().begin()?;
//!     ctx.persist(&book, "1", json!({"title": "Dune"}))?;
//!     ctx.transaction().commit()?;
//!     ctx.close()?;
//!     Ok(())
//! });
//!
//! assert!(report.outcome.is_passed());
//! assert!(report.diagnostics.is_empty());
//! ```

mod case;
mod errors;
mod report;
mod session;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

pub use case::{CaseSpec, TestCase};
pub use errors::{BodyResult, BoxError, TestFailure};
pub use report::{Diagnostic, Outcome, TestReport};
pub use session::Session;

use crate::backend::{Context, Factory, Provider};
use crate::config::build_config;
use crate::constants::{DEFAULT_PROPERTIES_PATH, PROPERTIES_PATH_ENV};
use crate::dialect::Dialect;
use report::error_chain;

/// Where the harness reads its ambient configuration from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessSettings {
    /// Base properties resource. A missing file is an empty base.
    pub properties_path: PathBuf,
    /// Dialect to check applicability against instead of the provider's.
    pub dialect_override: Option<Dialect>,
}

impl HarnessSettings {
    /// Settings from `PERSISTENCE_PROPERTIES` and `TEST_DIALECT`, falling back
    /// to the defaults.
    pub fn from_env() -> Self {
        let properties_path = std::env::var_os(PROPERTIES_PATH_ENV)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROPERTIES_PATH));
        Self {
            properties_path,
            dialect_override: Dialect::from_env(),
        }
    }

    /// Use a different properties resource.
    pub fn with_properties_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.properties_path = path.into();
        self
    }

    /// Check applicability against `dialect` instead of the provider's.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect_override = Some(dialect);
        self
    }
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            properties_path: PathBuf::from(DEFAULT_PROPERTIES_PATH),
            dialect_override: None,
        }
    }
}

/// Lifecycle phase of the current or last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No run has started.
    NotStarted,
    /// The last run was skipped for its dialect.
    Skipped,
    /// Building configuration and creating the factory.
    SettingUp,
    /// The body is running.
    Running,
    /// The factory is being released.
    TearingDown,
    /// The last run completed, passed or failed.
    Finished,
}

/// Drives one [`TestCase`] against one [`Provider`].
///
/// The harness exclusively owns the factory and current context of a run.
/// It is single-threaded: runs are sequential and the body is a plain
/// blocking call.
pub struct Harness<C: TestCase> {
    case: C,
    provider: Box<dyn Provider>,
    settings: HarnessSettings,
    factory: Option<Box<dyn Factory>>,
    context: Option<Box<dyn Context>>,
    phase: Phase,
    diagnostics: Vec<Diagnostic>,
}

impl<C: TestCase> Harness<C> {
    /// Harness with settings read from the environment.
    pub fn new(case: C, provider: impl Provider + 'static) -> Self {
        Self::with_settings(case, provider, HarnessSettings::from_env())
    }

    /// Harness with explicit settings.
    pub fn with_settings(case: C, provider: impl Provider + 'static, settings: HarnessSettings) -> Self {
        Self {
            case,
            provider: Box::new(provider),
            settings,
            factory: None,
            context: None,
            phase: Phase::NotStarted,
            diagnostics: Vec::new(),
        }
    }

    /// The test case.
    pub fn case(&self) -> &C {
        &self.case
    }

    /// The settings in use.
    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Phase of the current or last run.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Dialect the applicability check runs against.
    pub fn dialect(&self) -> Dialect {
        self.settings
            .dialect_override
            .clone()
            .unwrap_or_else(|| self.provider.dialect())
    }

    /// Build the configuration this harness would hand to the provider.
    pub fn build_config(&self) -> crate::Result<crate::config::ConfigMap> {
        Ok(build_config(&self.case, &self.settings.properties_path)?)
    }

    /// Run `body` through the full lifecycle and report the outcome.
    pub fn run<F>(&mut self, body: F) -> TestReport
    where
        F: FnOnce(&mut Session<'_>) -> BodyResult,
    {
        let name = self.case.name();
        let span = tracing::info_span!("test_case", name = %name);
        let outcome = span.in_scope(|| self.run_bare(body));
        TestReport {
            name,
            outcome,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn run_bare<F>(&mut self, body: F) -> Outcome
    where
        F: FnOnce(&mut Session<'_>) -> BodyResult,
    {
        self.diagnostics.clear();
        self.context = None;

        let dialect = self.dialect();
        if !self.case.dialect_applicable(&dialect) {
            self.enter(Phase::Skipped);
            tracing::info!(%dialect, "Test not applicable to dialect, skipping");
            return Outcome::Skipped { dialect };
        }

        self.enter(Phase::SettingUp);
        if let Err(source) = self.set_up() {
            tracing::error!(error = %error_chain(&source), "Test setup failed");
            self.enter(Phase::Finished);
            return Outcome::Failed(TestFailure::Setup { source });
        }

        self.enter(Phase::Running);
        let mut failure = self.run_guarded(body).err();

        self.enter(Phase::TearingDown);
        if let Err(source) = self.tear_down() {
            if failure.is_none() {
                failure = Some(TestFailure::Teardown { source });
            } else {
                let reason = error_chain(&source);
                tracing::warn!(error = %reason, "Teardown failed after an earlier failure");
                self.diagnostics
                    .push(Diagnostic::TeardownSuppressed { reason });
            }
        }

        self.enter(Phase::Finished);
        match failure {
            None => Outcome::Passed,
            Some(failure) => Outcome::Failed(failure),
        }
    }

    fn set_up(&mut self) -> crate::Result<()> {
        let config = self.build_config()?;
        if let Ok(rendered) = serde_json::to_string(&config) {
            tracing::debug!(config = %rendered, "Built test configuration");
        }
        self.factory = Some(self.provider.create_factory(&config)?);
        Ok(())
    }

    fn tear_down(&mut self) -> crate::Result<()> {
        match self.factory.take() {
            Some(mut factory) => factory.close(),
            None => Ok(()),
        }
    }

    /// Run the body with transaction and context hygiene checks.
    fn run_guarded<F>(&mut self, body: F) -> Result<(), TestFailure>
    where
        F: FnOnce(&mut Session<'_>) -> BodyResult,
    {
        let Some(factory) = self.factory.as_deref() else {
            return Ok(());
        };

        let mut session = Session::new(factory, &mut self.context);
        let opened = session.get_or_create_context().map(|_| ());
        let result = match opened {
            Err(source) => Err(TestFailure::ContextUnavailable { source }),
            Ok(()) => match panic::catch_unwind(AssertUnwindSafe(|| body(&mut session))) {
                Ok(Ok(())) => self.check_transaction_closed(),
                Ok(Err(err)) => {
                    self.roll_back_quietly();
                    Err(TestFailure::Body(err))
                }
                Err(payload) => {
                    self.roll_back_quietly();
                    Err(TestFailure::from_panic(payload))
                }
            },
        };

        self.close_leftover_context();
        result
    }

    /// After a successful body: an active transaction is a test failure.
    fn check_transaction_closed(&mut self) -> Result<(), TestFailure> {
        let Some(context) = self.context.as_deref_mut() else {
            return Ok(());
        };
        if !context.is_open() || !context.transaction().is_active() {
            return Ok(());
        }

        let id = context.id();
        tracing::error!(context = %id, "Test left an open transaction, rolling back");
        if let Err(e) = context.transaction().rollback() {
            let reason = error_chain(&e);
            tracing::warn!(context = %id, error = %reason, "Rollback of leaked transaction failed");
            self.diagnostics
                .push(Diagnostic::RollbackFailed { context: id, reason });
        }
        Err(TestFailure::LeakedTransaction)
    }

    /// After a failed body: roll back if needed, never masking the body's failure.
    fn roll_back_quietly(&mut self) {
        let Some(context) = self.context.as_deref_mut() else {
            return;
        };
        if !context.is_open() || !context.transaction().is_active() {
            return;
        }

        let id = context.id();
        if let Err(e) = context.transaction().rollback() {
            let reason = error_chain(&e);
            tracing::warn!(
                context = %id,
                error = %reason,
                "Rollback after test failure failed; reporting the original failure"
            );
            self.diagnostics
                .push(Diagnostic::RollbackFailed { context: id, reason });
        }
    }

    /// Close whatever context is still open after the body, with a warning.
    fn close_leftover_context(&mut self) {
        let Some(mut context) = self.context.take() else {
            return;
        };
        if !context.is_open() {
            return;
        }

        let id = context.id();
        match context.close() {
            Ok(()) => {
                tracing::warn!(context = %id, "The context is not closed. Closing it.");
                self.diagnostics
                    .push(Diagnostic::ContextLeftOpen { context: id });
            }
            Err(e) => {
                let reason = error_chain(&e);
                tracing::warn!(context = %id, error = %reason, "Could not close leftover context");
                self.diagnostics
                    .push(Diagnostic::ContextCloseFailed { context: id, reason });
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "Lifecycle phase");
        self.phase = phase;
    }
}
