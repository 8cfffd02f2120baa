//! The guard around the body: leaked transactions, body errors and panics.

use std::fmt;

use persistence_testbed::backend::in_memory::InMemory;
use persistence_testbed::{CaseSpec, TestFailure};
use serde_json::json;

use crate::helpers::*;

#[derive(Debug)]
struct IllegalState(&'static str);

impl fmt::Display for IllegalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal state: {}", self.0)
    }
}

impl std::error::Error for IllegalState {}

#[test]
fn test_leaked_transaction_fails_passing_body() {
    let provider = InMemory::new();
    let journal = provider.journal();
    let mut harness = harness_for(library_case(), provider.clone());

    let report = harness.run(|session| {
        let ctx = session.get_or_create_context()?;
        ctx.transaction().begin()?;
        ctx.persist(&book(), "dune", json!({"title": "Dune"}))?;
        Ok(())
    });

    let failure = report.outcome.failure().expect("leak should fail the test");
    assert!(failure.is_leaked_transaction());
    assert!(failure.to_string().contains("open transaction"));
    assert_eq!(journal.rollbacks(), 1);
    // the leftover context is closed after the rollback
    assert!(report.left_context_open());
    assert_eq!(journal.contexts_closed(), 1);
    assert_eq!(journal.factories_closed(), 1);
}

#[test]
fn test_leaked_transaction_on_backend_matrix() {
    let mut harness = harness_for(library_case(), test_provider());

    let report = harness.run(|session| {
        let ctx = session.get_or_create_context()?;
        ctx.transaction().begin()?;
        ctx.persist(&author(), "herbert", json!({"name": "Frank Herbert"}))?;
        Ok(())
    });

    let failure = report.outcome.failure().expect("leak should fail the test");
    assert!(failure.is_leaked_transaction());
}

#[test]
#[should_panic(expected = "open transaction")]
fn test_finish_reports_leaked_transaction() {
    harness_for(library_case(), InMemory::new())
        .run(|session| {
            session.get_or_create_context()?.transaction().begin()?;
            Ok(())
        })
        .finish();
}

#[test]
fn test_body_error_is_the_cause() {
    let provider = InMemory::new();
    let journal = provider.journal();
    let mut harness = harness_for(library_case(), provider);

    let report = harness.run(|session| {
        let ctx = session.get_or_create_context()?;
        ctx.transaction().begin()?;
        Err(IllegalState("x").into())
    });

    let failure = report.outcome.failure().expect("body error should fail the test");
    assert!(failure.is_body_failure());
    assert!(!failure.is_leaked_transaction());
    let cause = failure.body_error().expect("body error kept");
    let cause = cause
        .downcast_ref::<IllegalState>()
        .expect("cause is the body's own error");
    assert_eq!(cause.0, "x");
    // the active transaction was still rolled back
    assert_eq!(journal.rollbacks(), 1);
    assert_eq!(journal.factories_closed(), 1);
}

#[test]
fn test_body_error_without_transaction_skips_rollback() {
    let provider = InMemory::new();
    let journal = provider.journal();
    let mut harness = harness_for(library_case(), provider);

    let report = harness.run(|_session| Err(IllegalState("x").into()));

    let failure = report.outcome.failure().expect("body error should fail the test");
    let cause = failure
        .body_error()
        .and_then(|err| err.downcast_ref::<IllegalState>())
        .expect("cause is the body's own error");
    assert_eq!(cause.to_string(), "illegal state: x");
    assert_eq!(journal.rollbacks(), 0);
    // the pre-opened context was left open and closed with a warning
    assert!(report.left_context_open());
    assert_eq!(journal.contexts_closed(), 1);
}

#[test]
fn test_panic_rolls_back_and_keeps_payload() {
    let provider = InMemory::new();
    let journal = provider.journal();
    let mut harness = harness_for(library_case(), provider.clone());

    let report = harness.run(|session| {
        let ctx = session.get_or_create_context()?;
        ctx.transaction().begin()?;
        ctx.persist(&book(), "dune", json!({"title": "Dune"}))?;
        panic!("assertion in body");
    });

    match report.outcome.failure() {
        Some(TestFailure::Panicked { message, payload }) => {
            assert_eq!(message, "assertion in body");
            let original = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned());
            assert_eq!(original.as_deref(), Some("assertion in body"));
        }
        other => panic!("expected a captured panic, got {other:?}"),
    }
    assert_eq!(journal.rollbacks(), 1);
    assert_eq!(journal.factories_closed(), 1);
    assert!(provider.table_names().is_empty());
}

#[test]
#[should_panic(expected = "original panic message")]
fn test_finish_resumes_original_panic() {
    harness_for(library_case(), InMemory::new())
        .run(|_session| panic!("original panic message"))
        .finish();
}

#[test]
fn test_uncommitted_writes_do_not_survive_rollback() {
    let provider = InMemory::new();
    let mut harness = harness_for(CaseSpec::new("rollback").with_class(book()), provider);

    let report = harness.run(|session| {
        let ctx = session.get_or_create_context()?;
        ctx.transaction().begin()?;
        ctx.persist(&book(), "dune", json!({"title": "Dune"}))?;
        assert!(ctx.find(&book(), "dune")?.is_some());
        ctx.transaction().rollback()?;
        assert_eq!(ctx.find(&book(), "dune")?, None);
        ctx.close()?;
        Ok(())
    });

    assert!(report.outcome.is_passed());
}
