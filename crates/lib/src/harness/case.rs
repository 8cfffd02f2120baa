//! Extension points a concrete test supplies to the harness.

use std::fmt;

use crate::dialect::Dialect;
use crate::entity::EntityClass;

/// Configuration hooks of a database-backed test.
///
/// Only [`TestCase::annotated_classes`] is required. All hooks must be free of
/// side effects: the harness may call them once per run.
///
/// ```
/// use persistence_testbed::{Dialect, EntityClass, TestCase};
///
/// struct Book;
/// struct Chapter;
///
/// struct LibraryTest;
///
/// impl TestCase for LibraryTest {
///     fn annotated_classes(&self) -> Vec<EntityClass> {
///         vec![EntityClass::of::<Book>(), EntityClass::of::<Chapter>()]
///     }
///
///     fn cached_classes(&self) -> Vec<(EntityClass, String)> {
///         vec![(EntityClass::of::<Book>(), "read-write".into())]
///     }
///
///     fn dialect_applicable(&self, dialect: &Dialect) -> bool {
///         *dialect != Dialect::Postgres
///     }
/// }
/// ```
pub trait TestCase {
    /// Entity classes to map.
    fn annotated_classes(&self) -> Vec<EntityClass>;

    /// Legacy mapping descriptor file names.
    fn legacy_descriptors(&self) -> Vec<String> {
        Vec::new()
    }

    /// Cache region per entity class.
    fn cached_classes(&self) -> Vec<(EntityClass, String)> {
        Vec::new()
    }

    /// Cache region per collection role (`<class name>.<field>`).
    fn cached_collections(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether the test should run against `dialect`.
    fn dialect_applicable(&self, dialect: &Dialect) -> bool {
        let _ = dialect;
        true
    }

    /// Name used in log spans and reports.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("test")
            .to_string()
    }
}

type DialectPredicate = Box<dyn Fn(&Dialect) -> bool + Send + Sync>;

/// A [`TestCase`] assembled from plain values.
///
/// For tests that do not need a dedicated type:
///
/// ```
/// use persistence_testbed::{CaseSpec, Dialect, EntityClass, TestCase};
///
/// let case = CaseSpec::new("orders_roundtrip")
///     .with_class(EntityClass::named("shop::Order"))
///     .with_cached_collection("shop::Order.items", "read-only")
///     .applies_to(|dialect| dialect.is_sql());
///
/// assert_eq!(case.name(), "orders_roundtrip");
/// assert!(!case.dialect_applicable(&Dialect::InMemory));
/// ```
pub struct CaseSpec {
    name: String,
    classes: Vec<EntityClass>,
    descriptors: Vec<String>,
    cached_classes: Vec<(EntityClass, String)>,
    cached_collections: Vec<(String, String)>,
    applies_to: Option<DialectPredicate>,
}

impl CaseSpec {
    /// Start an empty case with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
            descriptors: Vec::new(),
            cached_classes: Vec::new(),
            cached_collections: Vec::new(),
            applies_to: None,
        }
    }

    /// Map an entity class.
    pub fn with_class(mut self, class: EntityClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Map several entity classes.
    pub fn with_classes(mut self, classes: impl IntoIterator<Item = EntityClass>) -> Self {
        self.classes.extend(classes);
        self
    }

    /// Add a legacy descriptor file.
    pub fn with_descriptor(mut self, name: impl Into<String>) -> Self {
        self.descriptors.push(name.into());
        self
    }

    /// Assign a cache region to a class.
    pub fn with_cached_class(mut self, class: EntityClass, region: impl Into<String>) -> Self {
        self.cached_classes.push((class, region.into()));
        self
    }

    /// Assign a cache region to a collection role.
    pub fn with_cached_collection(
        mut self,
        role: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        self.cached_collections.push((role.into(), region.into()));
        self
    }

    /// Restrict the case to dialects accepted by `predicate`.
    pub fn applies_to(mut self, predicate: impl Fn(&Dialect) -> bool + Send + Sync + 'static) -> Self {
        self.applies_to = Some(Box::new(predicate));
        self
    }
}

impl TestCase for CaseSpec {
    fn annotated_classes(&self) -> Vec<EntityClass> {
        self.classes.clone()
    }

    fn legacy_descriptors(&self) -> Vec<String> {
        self.descriptors.clone()
    }

    fn cached_classes(&self) -> Vec<(EntityClass, String)> {
        self.cached_classes.clone()
    }

    fn cached_collections(&self) -> Vec<(String, String)> {
        self.cached_collections.clone()
    }

    fn dialect_applicable(&self, dialect: &Dialect) -> bool {
        self.applies_to.as_ref().is_none_or(|applies| applies(dialect))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Debug for CaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseSpec")
            .field("name", &self.name)
            .field("classes", &self.classes)
            .field("descriptors", &self.descriptors)
            .field("cached_classes", &self.cached_classes)
            .field("cached_collections", &self.cached_collections)
            .field("applies_to", &self.applies_to.is_some())
            .finish()
    }
}
