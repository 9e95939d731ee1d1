//! Error types for archive construction

use thiserror::Error;

/// Errors that can occur while building or writing a cpio archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// A declared dependency is not present in the packed archive.
    #[error("Dependency missing from archive: {0}")]
    MissingDependency(String),

    /// A required configuration key is unset.
    #[error("Missing required configuration key: {0}")]
    MissingConfig(&'static str),

    /// A device node table entry has the wrong shape.
    #[error("Invalid device node '{name}': {reason}")]
    InvalidNode { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;
