//! Error types for the emulator test runner

use thiserror::Error;

/// Errors that can occur while preparing or running a boot test
#[derive(Debug, Error)]
pub enum EmuError {
    /// A required configuration key is unset.
    #[error("Missing required configuration key: {0}")]
    MissingConfig(&'static str),

    /// The emulator process could not be started.
    #[error("Unable to start emulator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The emulator did not exit within the configured timeout.
    #[error("Test timed out after {0} seconds")]
    Timeout(u64),

    /// No output line matched the pass token.
    #[error("Test flag not found in output: {0}")]
    FlagNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, EmuError>;
