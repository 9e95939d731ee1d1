//! Error types for the configuration store

use thiserror::Error;

/// Errors that can occur in the configuration store
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A descriptor named a parameter kind outside the closed enumeration.
    #[error("Unknown parameter kind '{kind}' for '{name}'")]
    UnknownKind { name: String, kind: String },

    /// A parameter was re-registered with a different kind.
    ///
    /// Kinds are assigned exactly once; this is fatal.
    #[error("Parameter '{name}' is already registered as {existing}, refusing {requested}")]
    KindConflict {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    /// A value could not be coerced to its parameter's kind.
    #[error("Cannot coerce value for '{key}' to {kind}: {value}")]
    Coercion {
        key: String,
        kind: &'static str,
        value: String,
    },

    /// Values were still queued for unregistered parameters at validation.
    #[error("Unprocessed config values: {}", .0.join(", "))]
    UnprocessedValues(Vec<String>),

    /// A custom setter rejected a value.
    #[error("Custom setter for '{key}' failed: {source}")]
    Setter {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for configuration store operations
pub type Result<T> = std::result::Result<T, ConfigError>;
