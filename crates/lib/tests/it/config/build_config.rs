//! Configuration building from properties files and case hooks.

use std::io::Write;

use persistence_testbed::backend::in_memory::InMemory;
use persistence_testbed::config::{ConfigError, build_config, load_properties};
use persistence_testbed::constants::{
    CLASS_CACHE_PREFIX, COLLECTION_CACHE_PREFIX, LOADED_CLASSES, SCHEMA_AUTO, SCHEMA_CREATE_DROP,
    XML_FILE_NAMES,
};
use persistence_testbed::{CaseSpec, EntityClass, Error, Harness, HarnessSettings};
use tempfile::NamedTempFile;

use crate::helpers::*;

fn properties_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write properties");
    file
}

#[test]
fn test_schema_is_forced_to_create_drop() {
    let file = properties_file("persistence.schema.auto = validate\ncustom.setting = kept\n");

    let config = build_config(&library_case(), file.path()).unwrap();

    assert_eq!(config.get_text(SCHEMA_AUTO), Some(SCHEMA_CREATE_DROP));
    assert_eq!(config.get_text("custom.setting"), Some("kept"));
}

#[test]
fn test_missing_properties_file_is_empty_base() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_config(&library_case(), &dir.path().join("absent.properties")).unwrap();

    assert_eq!(config.get_text(SCHEMA_AUTO), Some(SCHEMA_CREATE_DROP));
    assert_eq!(
        config.get_list(LOADED_CLASSES),
        Some(&["library::Book".to_string(), "library::Author".to_string()][..])
    );
    assert!(!config.contains_key(XML_FILE_NAMES));
}

#[test]
fn test_hooks_override_properties() {
    let file = properties_file(&format!(
        "{CLASS_CACHE_PREFIX}.Ledger = read-only\nother = 1\n"
    ));
    let ledger = EntityClass::named("Ledger");
    let case = CaseSpec::new("ledger")
        .with_class(ledger.clone())
        .with_cached_class(ledger, "read-write")
        .with_cached_collection("Ledger.entries", "nonstrict-read-write")
        .with_descriptor("legacy/Ledger.hbm.xml");

    let config = build_config(&case, file.path()).unwrap();

    assert_eq!(
        config.get_text(&format!("{CLASS_CACHE_PREFIX}.Ledger")),
        Some("read-write")
    );
    assert_eq!(
        config.get_text(&format!("{COLLECTION_CACHE_PREFIX}.Ledger.entries")),
        Some("nonstrict-read-write")
    );
    assert_eq!(
        config.get_list(XML_FILE_NAMES),
        Some(&["legacy/Ledger.hbm.xml".to_string()][..])
    );
    assert_eq!(config.get_text("other"), Some("1"));
}

#[test]
fn test_build_config_is_repeatable() {
    let file = properties_file("a = 1\n");
    let case = library_case().with_cached_class(author(), "read-write");

    let first = build_config(&case, file.path()).unwrap();
    let second = build_config(&case, file.path()).unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[test]
fn test_malformed_properties_report_line() {
    let file = properties_file("ok = 1\n= no key\n");

    let err = load_properties(file.path()).expect_err("empty key is malformed");
    match &err {
        ConfigError::MalformedProperties { line, .. } => assert_eq!(*line, 2),
        other => panic!("expected a malformed properties error, got {other:?}"),
    }
    assert_eq!(err.path(), file.path());
}

#[test]
fn test_malformed_properties_fail_setup() {
    let file = properties_file("= no key\n");
    let provider = InMemory::new();
    let journal = provider.journal();
    let settings = HarnessSettings::default().with_properties_path(file.path());
    let mut harness = Harness::with_settings(CaseSpec::new("bad_props"), provider, settings);

    let report = harness.run(|_session| Ok(()));

    let failure = report.outcome.failure().expect("setup should fail");
    assert!(failure.is_setup_failure());
    assert!(matches!(
        failure.harness_error(),
        Some(Error::Config(ConfigError::MalformedProperties { .. }))
    ));
    assert_eq!(journal.factories_created(), 0);
}

#[test]
fn test_harness_build_config_uses_settings() {
    let file = properties_file("from.file = yes\n");
    let settings = HarnessSettings::default().with_properties_path(file.path());
    let harness = Harness::with_settings(library_case(), InMemory::new(), settings);

    let config = harness.build_config().unwrap();
    assert_eq!(config.get_text("from.file"), Some("yes"));
    assert_eq!(config.get_text(SCHEMA_AUTO), Some(SCHEMA_CREATE_DROP));
}
