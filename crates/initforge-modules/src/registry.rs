//! Function source registry
//!
//! Two tiers: built-in sources registered at process start, and extension
//! sources added through an explicit call by embedding code. Extension
//! sources are treated as sideloaded; resolving one is logged as a warning
//! but never alters control flow.

use std::collections::HashMap;

use crate::error::{ModuleError, Result};
use crate::types::FunctionSource;

/// Registry mapping source identifiers to function sources.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    builtin: HashMap<String, FunctionSource>,
    extensions: HashMap<String, FunctionSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in source.
    pub fn register(&mut self, source: FunctionSource) {
        tracing::debug!("Registered function source: {}", source.name());
        self.builtin.insert(source.name().to_string(), source);
    }

    /// Register an extension source.
    ///
    /// Extensions stand in for code discovered outside the bundled set and
    /// stay untrusted: every resolution through this tier is logged.
    pub fn register_extension(&mut self, source: FunctionSource) {
        tracing::debug!("Registered extension source: {}", source.name());
        self.extensions.insert(source.name().to_string(), source);
    }

    /// Resolve a source identifier, built-in tier first.
    pub fn resolve(&self, name: &str) -> Result<&FunctionSource> {
        if let Some(source) = self.builtin.get(name) {
            return Ok(source);
        }
        if let Some(source) = self.extensions.get(name) {
            tracing::warn!("Using sideloaded function source: {}", name);
            return Ok(source);
        }
        Err(ModuleError::SourceNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtin.contains_key(name) || self.extensions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_shadows_extension() {
        let mut registry = SourceRegistry::new();
        registry.register(FunctionSource::new("base.base"));
        registry.register_extension(FunctionSource::new("base.base"));
        registry.register_extension(FunctionSource::new("user.extra"));

        assert!(registry.resolve("base.base").is_ok());
        assert!(registry.resolve("user.extra").is_ok());
    }

    #[test]
    fn test_unknown_source_is_fatal() {
        let registry = SourceRegistry::new();
        let err = registry.resolve("no.such.source").unwrap_err();
        assert!(matches!(err, ModuleError::SourceNotFound(_)));
    }
}
