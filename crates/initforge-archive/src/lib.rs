//! cpio archive construction for the initforge build pipeline
//!
//! The build directory is packed into an in-memory newc archive, declared
//! dependencies are verified against the packed entries, device nodes from
//! the configuration are embedded on request, and the result is written in
//! one operation with the previous archive rotated aside.

pub mod builder;
pub mod error;
pub mod newc;

pub use builder::{declare_dependency, make_cpio, NodeSpec};
pub use error::{ArchiveError, Result};
pub use newc::CpioArchive;
