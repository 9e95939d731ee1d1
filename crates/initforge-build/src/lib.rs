//! Build orchestration for initforge
//!
//! Runs module-contributed hook functions in a fixed phase order, assembles
//! the init and profile scripts, applies masking, and hands off to the
//! archive and emulator crates through built-in function sources.

pub mod error;
pub mod generator;
pub mod hooks;
pub mod sources;

pub use error::{BuildError, Result};
pub use generator::InitramfsGenerator;
pub use sources::builtin_registry;
