//! Test configuration assembly.
//!
//! A [`ConfigMap`] is built fresh for every test from the base properties
//! resource and the extension points of the [`TestCase`], handed once to
//! [`Provider::create_factory`](crate::backend::Provider::create_factory), and
//! then dropped.

mod errors;
pub mod properties;

use std::path::Path;

use serde::Serialize;
use serde::ser::SerializeMap;

pub use errors::ConfigError;
pub use properties::load_properties;

use crate::constants::{
    CLASS_CACHE_PREFIX, COLLECTION_CACHE_PREFIX, LOADED_CLASSES, SCHEMA_AUTO, SCHEMA_CREATE_DROP,
    XML_FILE_NAMES,
};
use crate::harness::TestCase;

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Plain string setting, as read from a properties resource.
    Text(String),
    /// List of names, e.g. loaded classes or descriptor files.
    List(Vec<String>),
    /// Anything else the backend understands.
    Opaque(serde_json::Value),
}

impl ConfigValue {
    /// The string value, if this is [`ConfigValue::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The list value, if this is [`ConfigValue::List`].
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::List(list) => Some(list),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(text: &str) -> Self {
        ConfigValue::Text(text.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(text: String) -> Self {
        ConfigValue::Text(text)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(list: Vec<String>) -> Self {
        ConfigValue::List(list)
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        ConfigValue::Opaque(value)
    }
}

/// Insertion-ordered map from setting name to [`ConfigValue`].
///
/// Inserting an existing key replaces its value but keeps its position, so the
/// map reads in the order settings were first introduced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a setting, returning the previous value if the key was present.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Option<ConfigValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a setting.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a text setting.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_text)
    }

    /// Look up a list setting.
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        self.get(key).and_then(ConfigValue::as_list)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a setting.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Number of settings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no settings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Setting names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Settings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Settings under `prefix.`, yielding the remainder of each key.
    ///
    /// ```
    /// use persistence_testbed::config::ConfigMap;
    ///
    /// let mut config = ConfigMap::new();
    /// config.insert("cache.class.app::Book", "read-write");
    /// config.insert("cache.classes", "ignored");
    /// let scoped: Vec<_> = config.with_prefix("cache.class").collect();
    /// assert_eq!(scoped.len(), 1);
    /// assert_eq!(scoped[0].0, "app::Book");
    /// ```
    pub fn with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ConfigValue)> + 'a {
        self.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| (rest, value))
        })
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ConfigMap::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> Extend<(K, V)> for ConfigMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl Serialize for ConfigMap {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Build the configuration for one test.
///
/// Starts from the properties at `properties_path` (absent is fine), forces
/// create-drop schema management and adds the mapped classes, cache regions
/// and legacy descriptors declared by `case`.
pub fn build_config<C: TestCase + ?Sized>(
    case: &C,
    properties_path: &Path,
) -> Result<ConfigMap, ConfigError> {
    let mut config = load_properties(properties_path)?;
    config.insert(SCHEMA_AUTO, SCHEMA_CREATE_DROP);

    let classes: Vec<String> = case
        .annotated_classes()
        .iter()
        .map(|class| class.name().to_string())
        .collect();
    config.insert(LOADED_CLASSES, classes);

    for (class, region) in case.cached_classes() {
        config.insert(format!("{CLASS_CACHE_PREFIX}.{}", class.name()), region);
    }
    for (role, region) in case.cached_collections() {
        config.insert(format!("{COLLECTION_CACHE_PREFIX}.{role}"), region);
    }

    let descriptors = case.legacy_descriptors();
    if !descriptors.is_empty() {
        config.insert(XML_FILE_NAMES, descriptors);
    }

    Ok(config)
}
