//! Typed configuration store for the initforge build pipeline
//!
//! Modules contribute configuration through a single key/value store with
//! per-kind merge rules: list kinds append (with or without deduplication),
//! table kinds shallow-merge, scalar kinds coerce and overwrite. Values set
//! before their parameter kind is known are held in a per-key FIFO queue and
//! replayed when the kind is registered.
//!
//! Parameter kinds form a closed enumeration ([`ParamKind`]); a kind is
//! assigned exactly once and never changes afterwards.

pub mod error;
pub mod store;
pub mod value;

pub use error::{ConfigError, Result};
pub use store::{ConfigStore, Setter, SetterFn};
pub use value::{ConfigValue, ParamKind};
