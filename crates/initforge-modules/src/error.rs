//! Error types for module loading and import processing

use initforge_config::ConfigError;
use thiserror::Error;

/// Errors that can occur while loading modules or processing imports
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Descriptor missing from both search locations.
    #[error("Unable to locate module: {0}")]
    ModuleNotFound(String),

    /// An import referenced a source identifier no registry tier provides.
    #[error("Function source not found: {0}")]
    SourceNotFound(String),

    /// A named function does not exist on its resolved source.
    #[error("[{source_name}] Function not found: {function}")]
    FunctionNotFound {
        source_name: String,
        function: String,
    },

    /// The same function name was imported twice for one hook.
    #[error("[{hook}] Function '{function}' already registered")]
    DuplicateFunction { hook: String, function: String },

    /// A function name collides with a declared binary.
    #[error("Function collides with declared binary: {0}")]
    BinaryCollision(String),

    /// A second custom-init function was assigned.
    #[error("Custom init function already defined: {0}")]
    CustomInitTaken(String),

    /// Descriptor could not be parsed as TOML.
    #[error("[{path}] Unable to parse module descriptor: {source}")]
    Descriptor {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Descriptor has a structurally invalid section.
    #[error("[{module}] Invalid descriptor section '{section}': {reason}")]
    InvalidSection {
        module: String,
        section: String,
        reason: String,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for module operations
pub type Result<T> = std::result::Result<T, ModuleError>;
