//! Constants used throughout the testbed.
//!
//! Central definitions for setting keys, resource paths and environment
//! variables shared by the configuration builder, the harness and the backends.

/// Schema management setting. The harness always forces [`SCHEMA_CREATE_DROP`].
pub const SCHEMA_AUTO: &str = "persistence.schema.auto";

/// Create the schema when the factory opens and drop it when it closes.
pub const SCHEMA_CREATE_DROP: &str = "create-drop";

/// Create the schema when the factory opens and leave it in place.
pub const SCHEMA_CREATE: &str = "create";

/// List of fully-qualified entity class names to map.
pub const LOADED_CLASSES: &str = "persistence.loaded_classes";

/// Prefix for per-class cache region settings, followed by `.<class name>`.
pub const CLASS_CACHE_PREFIX: &str = "persistence.cache.class";

/// Prefix for per-collection cache region settings, followed by `.<role>`.
pub const COLLECTION_CACHE_PREFIX: &str = "persistence.cache.collection";

/// List of legacy mapping descriptor file names.
pub const XML_FILE_NAMES: &str = "persistence.xml_files";

/// Context option marking a context read-only.
pub const CONTEXT_READ_ONLY: &str = "persistence.context.read_only";

/// Properties resource loaded as the base of every configuration.
pub const DEFAULT_PROPERTIES_PATH: &str = "persistence.properties";

/// Environment variable overriding the properties resource path.
pub const PROPERTIES_PATH_ENV: &str = "PERSISTENCE_PROPERTIES";

/// Environment variable overriding the dialect reported by the backend.
pub const DIALECT_ENV: &str = "TEST_DIALECT";
