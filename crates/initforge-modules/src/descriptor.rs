//! Module descriptor parsing
//!
//! A descriptor is a TOML document whose top-level keys are configuration
//! values, except for two reserved sections: `imports` (hook name to
//! {source: [function, ...]}) and `custom_parameters` (parameter name to
//! kind name). Document order of the plain keys is preserved.

use std::fs;
use std::path::Path;

use toml::Table;

use crate::error::{ModuleError, Result};

/// Reserved top-level sections, applied after all plain keys.
pub const RESERVED_SECTIONS: [&str; 2] = ["imports", "custom_parameters"];

/// A parsed module descriptor.
#[derive(Debug, Default)]
pub struct ModuleDescriptor {
    /// Plain configuration keys in document order.
    pub settings: Table,
    /// Hook name to {source identifier: [function names]}.
    pub imports: Table,
    /// Parameter name to kind name.
    pub custom_parameters: Table,
}

impl ModuleDescriptor {
    /// Parse a descriptor from TOML text.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let mut settings: Table = text.parse().map_err(|source| ModuleError::Descriptor {
            path: name.to_string(),
            source,
        })?;

        let imports = take_table(&mut settings, name, "imports")?;
        let custom_parameters = take_table(&mut settings, name, "custom_parameters")?;

        Ok(Self {
            settings,
            imports,
            custom_parameters,
        })
    }

    /// Load and parse a descriptor file.
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(name, &text)
    }
}

fn take_table(settings: &mut Table, module: &str, section: &str) -> Result<Table> {
    match settings.remove(section) {
        None => Ok(Table::new()),
        Some(toml::Value::Table(table)) => Ok(table),
        Some(other) => Err(ModuleError::InvalidSection {
            module: module.to_string(),
            section: section.to_string(),
            reason: format!("expected a table, got {}", other.type_str()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_reserved_sections() {
        let text = r##"
            shebang = "#!/bin/bash"
            binaries = [ "sh" ]

            [imports.build_tasks]
            "base.base" = [ "prepare" ]

            [custom_parameters]
            extra_flags = "list"
        "##;

        let descriptor = ModuleDescriptor::parse("base.base", text).unwrap();
        assert_eq!(descriptor.settings.len(), 2);
        assert!(descriptor.imports.contains_key("build_tasks"));
        assert_eq!(
            descriptor.custom_parameters["extra_flags"].as_str(),
            Some("list")
        );
    }

    #[test]
    fn test_settings_preserve_document_order() {
        let text = "zeta = 1\nalpha = 2\nmiddle = 3\n";
        let descriptor = ModuleDescriptor::parse("m", text).unwrap();

        let keys: Vec<&str> = descriptor.settings.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "middle"]);
    }

    #[test]
    fn test_invalid_reserved_section_shape() {
        let err = ModuleDescriptor::parse("m", "imports = 3\n").unwrap_err();
        assert!(matches!(err, ModuleError::InvalidSection { .. }));
    }

    #[test]
    fn test_parse_error_names_module() {
        let err = ModuleDescriptor::parse("broken.module", "not valid = = toml").unwrap_err();
        assert!(err.to_string().contains("broken.module"));
    }
}
