//! Entity class identifiers.

use std::fmt;

/// Identifier of an entity type handed to the persistence backend for mapping.
///
/// The identifier carries the fully-qualified type name, which keys cache
/// settings, and derives the simple name from its last path segment, which the
/// reference backends use as the table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityClass {
    name: String,
}

impl EntityClass {
    /// Identify the Rust type `T`.
    ///
    /// ```
    /// use persistence_testbed::EntityClass;
    ///
    /// struct Book;
    /// let class = EntityClass::of::<Book>();
    /// assert_eq!(class.simple_name(), "Book");
    /// ```
    pub fn of<T: ?Sized>() -> Self {
        Self {
            name: std::any::type_name::<T>().to_string(),
        }
    }

    /// Identify an entity by its fully-qualified name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The fully-qualified name, e.g. `app::model::Book`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last path segment of the name, e.g. `Book`.
    ///
    /// Generic arguments are stripped, so `app::Page<app::Book>` yields `Page`.
    pub fn simple_name(&self) -> &str {
        let base = self.name.split('<').next().unwrap_or(&self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for EntityClass {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}
