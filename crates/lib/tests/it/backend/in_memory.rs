//! Direct use of the in-memory backend, without the harness.

use persistence_testbed::backend::in_memory::InMemory;
use persistence_testbed::backend::{BackendError, ContextOptions, Factory, Provider};
use persistence_testbed::config::{ConfigMap, build_config};
use persistence_testbed::constants::{SCHEMA_AUTO, SCHEMA_CREATE};
use persistence_testbed::{EntityClass, Error};
use serde_json::json;

use crate::helpers::*;

fn library_config() -> ConfigMap {
    build_config(&library_case(), isolated_settings().properties_path.as_path()).unwrap()
}

fn open_factory(provider: &InMemory) -> Box<dyn Factory> {
    provider.create_factory(&library_config()).unwrap()
}

#[test]
fn test_create_drop_manages_tables() {
    let provider = InMemory::new();
    let mut factory = open_factory(&provider);
    assert_eq!(provider.table_names(), vec!["entity_author", "entity_book"]);

    factory.close().unwrap();
    assert!(provider.table_names().is_empty());
    assert!(!factory.is_open());
}

#[test]
fn test_create_keeps_tables_after_close() {
    let provider = InMemory::new();
    let mut config = library_config();
    config.insert(SCHEMA_AUTO, SCHEMA_CREATE);

    let mut factory = provider.create_factory(&config).unwrap();
    factory.close().unwrap();
    assert_eq!(provider.table_names(), vec!["entity_author", "entity_book"]);
}

#[test]
fn test_double_factory_close_is_an_error() {
    let provider = InMemory::new();
    let mut factory = open_factory(&provider);
    factory.close().unwrap();

    let err = factory.close().unwrap_err();
    assert!(err.is_closed());
    assert!(
        factory
            .create_context()
            .err()
            .is_some_and(|e| e.is_closed())
    );
}

#[test]
fn test_commit_applies_staged_writes() {
    let provider = InMemory::new();
    let factory = open_factory(&provider);
    let mut ctx = factory.create_context().unwrap();

    ctx.transaction().begin().unwrap();
    ctx.persist(&book(), "dune", json!({"title": "Dune"})).unwrap();
    ctx.persist(&book(), "emma", json!({"title": "Emma"})).unwrap();
    assert_eq!(provider.row_count("entity_book"), Some(0));

    ctx.transaction().commit().unwrap();
    assert_eq!(provider.row_count("entity_book"), Some(2));

    ctx.transaction().begin().unwrap();
    assert!(ctx.remove(&book(), "emma").unwrap());
    assert!(!ctx.remove(&book(), "missing").unwrap());
    assert_eq!(ctx.find(&book(), "emma").unwrap(), None);
    ctx.transaction().commit().unwrap();
    assert_eq!(provider.row_count("entity_book"), Some(1));
}

#[test]
fn test_other_contexts_see_only_committed_data() {
    let provider = InMemory::new();
    let factory = open_factory(&provider);
    let mut writer = factory.create_context().unwrap();
    let mut reader = factory.create_context().unwrap();

    writer.transaction().begin().unwrap();
    writer.persist(&author(), "austen", json!({"name": "Jane Austen"})).unwrap();
    assert_eq!(reader.find(&author(), "austen").unwrap(), None);

    writer.transaction().commit().unwrap();
    assert_eq!(
        reader.find(&author(), "austen").unwrap(),
        Some(json!({"name": "Jane Austen"}))
    );
}

#[test]
fn test_writes_require_transaction() {
    let provider = InMemory::new();
    let factory = open_factory(&provider);
    let mut ctx = factory.create_context().unwrap();

    let err = ctx.persist(&book(), "dune", json!({})).unwrap_err();
    assert!(err.is_transaction_error());
    let err = ctx.remove(&book(), "dune").unwrap_err();
    assert!(err.is_transaction_error());
}

#[test]
fn test_transaction_demarcation_errors() {
    let provider = InMemory::new();
    let factory = open_factory(&provider);
    let mut ctx = factory.create_context().unwrap();

    assert!(matches!(
        ctx.transaction().commit(),
        Err(Error::Backend(BackendError::NoActiveTransaction))
    ));
    ctx.transaction().begin().unwrap();
    assert!(matches!(
        ctx.transaction().begin(),
        Err(Error::Backend(BackendError::TransactionAlreadyActive))
    ));
    ctx.transaction().rollback().unwrap();
    assert!(!ctx.transaction().is_active());
}

#[test]
fn test_unmapped_entity_is_rejected() {
    let provider = InMemory::new();
    let factory = open_factory(&provider);
    let mut ctx = factory.create_context().unwrap();

    let err = ctx
        .find(&EntityClass::named("library::Shelf"), "1")
        .unwrap_err();
    assert!(err.is_mapping_error());
}

#[test]
fn test_read_only_context_allows_reads() {
    let provider = InMemory::new();
    let factory = open_factory(&provider);
    let mut ctx = factory
        .create_context_with(&ContextOptions::read_only())
        .unwrap();

    ctx.transaction().begin().unwrap();
    assert_eq!(ctx.find(&book(), "dune").unwrap(), None);
    assert!(matches!(
        ctx.persist(&book(), "dune", json!({})),
        Err(Error::Backend(BackendError::ReadOnlyContext { .. }))
    ));
}

#[test]
fn test_closing_context_rolls_back() {
    let provider = InMemory::new();
    let journal = provider.journal();
    let factory = open_factory(&provider);
    let mut ctx = factory.create_context().unwrap();

    ctx.transaction().begin().unwrap();
    ctx.persist(&book(), "dune", json!({"title": "Dune"})).unwrap();
    ctx.close().unwrap();

    assert!(!ctx.is_open());
    assert!(!ctx.transaction().is_active());
    assert_eq!(journal.rollbacks(), 1);
    assert_eq!(provider.row_count("entity_book"), Some(0));
    assert!(ctx.close().unwrap_err().is_closed());
    assert!(ctx.find(&book(), "dune").unwrap_err().is_closed());
}

#[test]
fn test_closed_context_cannot_begin() {
    let provider = InMemory::new();
    let factory = open_factory(&provider);
    let mut ctx = factory.create_context().unwrap();
    ctx.close().unwrap();

    assert!(matches!(
        ctx.transaction().begin(),
        Err(Error::Backend(BackendError::ContextClosed { .. }))
    ));
    assert!(!ctx.transaction().is_active());
}

#[test]
fn test_cache_settings_for_mapped_classes_are_accepted() {
    let provider = InMemory::new();
    let case = library_case()
        .with_cached_class(book(), "read-write")
        .with_cached_collection("library::Author.books", "read-only")
        .with_descriptor("legacy/Book.hbm.xml");
    let config = build_config(&case, isolated_settings().properties_path.as_path()).unwrap();

    let mut factory = provider.create_factory(&config).unwrap();
    assert_eq!(factory.mapped_classes(), vec![author(), book()]);
    factory.close().unwrap();
}

#[test]
fn test_commit_fails_when_table_dropped() {
    let provider = InMemory::new();
    let mut factory = open_factory(&provider);
    let mut ctx = factory.create_context().unwrap();

    ctx.transaction().begin().unwrap();
    ctx.persist(&book(), "dune", json!({"title": "Dune"})).unwrap();
    factory.close().unwrap();

    let err = ctx.transaction().commit().unwrap_err();
    assert!(matches!(
        err,
        Error::Backend(BackendError::MissingTable { ref table }) if table == "entity_book"
    ));
}

#[test]
fn test_clones_share_store_and_journal() {
    let provider = InMemory::new();
    let observer = provider.clone();
    let mut factory = open_factory(&provider);

    assert_eq!(observer.table_names().len(), 2);
    assert_eq!(observer.journal().factories_created(), 1);
    factory.close().unwrap();
    assert_eq!(observer.journal().factories_closed(), 1);
}
