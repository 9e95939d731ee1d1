//! Error types for the build pipeline

use initforge_archive::ArchiveError;
use initforge_config::ConfigError;
use initforge_emu::EmuError;
use initforge_modules::ModuleError;
use thiserror::Error;

/// Errors that can occur while running the build pipeline
#[derive(Debug, Error)]
pub enum BuildError {
    /// A function name is already present in the named-function table.
    #[error("Function already included: {0}")]
    FunctionCollision(String),

    /// A function name collides with a declared binary.
    #[error("Function collides with declared binary: {0}")]
    BinaryCollision(String),

    /// A hook function failed.
    #[error("[{hook}] Function '{function}' failed: {source}")]
    Hook {
        hook: String,
        function: String,
        #[source]
        source: anyhow::Error,
    },

    /// A required configuration key is unset.
    #[error("Missing required configuration key: {0}")]
    MissingConfig(&'static str),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Emu(#[from] EmuError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;
