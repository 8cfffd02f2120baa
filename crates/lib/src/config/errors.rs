//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling a test configuration.
///
/// Both variants are fatal: a properties resource that exists but cannot be
/// used aborts setup before any factory is created.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The properties resource exists but could not be read.
    #[error("could not load properties from {}", path.display())]
    PropertiesRead {
        /// Path of the resource
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The properties resource contains a line that cannot be parsed.
    #[error("malformed properties in {} at line {line}: {reason}", path.display())]
    MalformedProperties {
        /// Path of the resource
        path: PathBuf,
        /// One-based line number where the logical line starts
        line: usize,
        /// What was wrong with the line
        reason: String,
    },
}

impl ConfigError {
    /// Path of the properties resource this error is about.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ConfigError::PropertiesRead { path, .. }
            | ConfigError::MalformedProperties { path, .. } => path,
        }
    }

    /// Check if this error came from reading the resource rather than parsing it.
    pub fn is_io_error(&self) -> bool {
        matches!(self, ConfigError::PropertiesRead { .. })
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}
