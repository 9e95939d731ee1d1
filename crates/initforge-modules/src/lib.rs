//! Module loading for the initforge build pipeline
//!
//! A module is a TOML descriptor declaring configuration values, custom
//! parameter kinds, and function imports. Functions themselves are Rust
//! callables published by [`FunctionSource`]s in a [`SourceRegistry`]
//! populated at process start; descriptors reference them by source
//! identifier and name. No code is ever loaded from disk.
//!
//! Descriptors are resolved from a bundled search directory first, then an
//! override directory, and applied in two passes: plain configuration keys
//! in document order, then the reserved `imports` and `custom_parameters`
//! sections.

pub mod descriptor;
pub mod error;
pub mod loader;
pub mod registry;
pub mod types;

pub use descriptor::ModuleDescriptor;
pub use error::{ModuleError, Result};
pub use loader::{ModuleLoader, HOOK_CONFIG_PROCESSING, HOOK_CUSTOM_INIT, HOOK_FUNCS};
pub use registry::SourceRegistry;
pub use types::{CustomInit, CustomInitFn, FunctionSource, HookFn, HookFunction, ScriptOutput};
