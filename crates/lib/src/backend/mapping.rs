//! Mapping metadata compiled from a [`ConfigMap`].
//!
//! Shared by the reference backends: which classes are mapped, which tables
//! they live in, what to do with the schema, and the cache assignments. Cache
//! settings are checked against the mapped classes here, so an inconsistent
//! test configuration fails factory creation instead of being ignored.

use std::collections::BTreeMap;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::config::ConfigMap;
use crate::constants::{
    CLASS_CACHE_PREFIX, COLLECTION_CACHE_PREFIX, LOADED_CLASSES, SCHEMA_AUTO, SCHEMA_CREATE,
    SCHEMA_CREATE_DROP, XML_FILE_NAMES,
};
use crate::entity::EntityClass;

/// Prefix for entity tables, keeping them clear of SQL keywords like `order`.
const TABLE_PREFIX: &str = "entity_";

/// What the factory does with the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaAction {
    /// Leave the schema alone.
    #[default]
    None,
    /// Create tables when the factory opens.
    Create,
    /// Create tables when the factory opens, drop them when it closes.
    CreateDrop,
}

impl SchemaAction {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(SCHEMA_CREATE_DROP) => SchemaAction::CreateDrop,
            Some(SCHEMA_CREATE) => SchemaAction::Create,
            _ => SchemaAction::None,
        }
    }

    /// Whether tables are created when the factory opens.
    pub fn creates(self) -> bool {
        !matches!(self, SchemaAction::None)
    }

    /// Whether tables are dropped when the factory closes.
    pub fn drops(self) -> bool {
        matches!(self, SchemaAction::CreateDrop)
    }
}

/// Compiled mapping metadata.
#[derive(Debug, Clone, Default)]
pub struct MappingPlan {
    schema: SchemaAction,
    /// class name -> table name
    tables: BTreeMap<String, String>,
    class_caches: BTreeMap<String, String>,
    collection_caches: BTreeMap<String, String>,
    descriptors: Vec<String>,
}

impl MappingPlan {
    /// Compile the plan, validating cache assignments and table names.
    pub fn from_config(config: &ConfigMap) -> Result<Self> {
        let schema = SchemaAction::parse(config.get_text(SCHEMA_AUTO));

        let mut tables = BTreeMap::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        for name in config.get_list(LOADED_CLASSES).unwrap_or_default() {
            let table = table_name(&EntityClass::named(name.as_str()));
            if let Some(first) = owners.get(&table) {
                if first != name {
                    return Err(BackendError::TableConflict {
                        table,
                        first: first.clone(),
                        second: name.clone(),
                    }
                    .into());
                }
                continue;
            }
            owners.insert(table.clone(), name.clone());
            tables.insert(name.clone(), table);
        }

        let mut class_caches = BTreeMap::new();
        for (class, value) in config.with_prefix(CLASS_CACHE_PREFIX) {
            if !tables.contains_key(class) {
                return Err(BackendError::UnknownCacheTarget {
                    key: format!("{CLASS_CACHE_PREFIX}.{class}"),
                }
                .into());
            }
            class_caches.insert(class.to_string(), region_of(value));
        }

        let mut collection_caches = BTreeMap::new();
        for (role, value) in config.with_prefix(COLLECTION_CACHE_PREFIX) {
            let owner = role.rsplit_once('.').map(|(owner, _)| owner);
            if !owner.is_some_and(|owner| tables.contains_key(owner)) {
                return Err(BackendError::UnknownCacheTarget {
                    key: format!("{COLLECTION_CACHE_PREFIX}.{role}"),
                }
                .into());
            }
            collection_caches.insert(role.to_string(), region_of(value));
        }

        let descriptors = config
            .get_list(XML_FILE_NAMES)
            .map(<[String]>::to_vec)
            .unwrap_or_default();

        Ok(Self {
            schema,
            tables,
            class_caches,
            collection_caches,
            descriptors,
        })
    }

    /// The schema action requested by the configuration.
    pub fn schema(&self) -> SchemaAction {
        self.schema
    }

    /// Mapped classes in name order.
    pub fn classes(&self) -> Vec<EntityClass> {
        self.tables.keys().map(|name| EntityClass::named(name.as_str())).collect()
    }

    /// Table names in class-name order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(String::as_str)
    }

    /// Table for a mapped class.
    pub fn table_for(&self, class: &EntityClass) -> Result<&str> {
        self.tables
            .get(class.name())
            .map(String::as_str)
            .ok_or_else(|| {
                BackendError::UnmappedEntity {
                    entity: class.name().to_string(),
                }
                .into()
            })
    }

    /// Cache region assigned to a class.
    pub fn class_cache(&self, class: &EntityClass) -> Option<&str> {
        self.class_caches.get(class.name()).map(String::as_str)
    }

    /// Cache region assigned to a collection role.
    pub fn collection_cache(&self, role: &str) -> Option<&str> {
        self.collection_caches.get(role).map(String::as_str)
    }

    /// Legacy descriptor files named by the configuration.
    pub fn descriptors(&self) -> &[String] {
        &self.descriptors
    }

    /// Log the compiled mapping at debug level.
    pub(crate) fn log_mapping(&self) {
        for (name, table) in &self.tables {
            let region = self.class_cache(&EntityClass::named(name.as_str()));
            tracing::debug!(class = %name, table = %table, cache = ?region, "Mapped entity");
        }
        for role in self.collection_caches.keys() {
            let region = self.collection_cache(role);
            tracing::debug!(role = %role, cache = ?region, "Cached collection");
        }
        if !self.descriptors().is_empty() {
            tracing::debug!(descriptors = ?self.descriptors(), "Legacy mapping descriptors");
        }
    }
}

/// Table name for an entity class: prefixed, lowercased simple name with
/// anything outside `[a-z0-9_]` replaced by `_`.
pub fn table_name(class: &EntityClass) -> String {
    let mut table = String::from(TABLE_PREFIX);
    table.extend(class.simple_name().chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '_'
        }
    }));
    table
}

fn region_of(value: &crate::config::ConfigValue) -> String {
    match value.as_text() {
        Some(text) => text.to_string(),
        None => serde_json::to_string(value).unwrap_or_default(),
    }
}
