//! Module loader
//!
//! Resolves module descriptors from the bundled directory first, then the
//! override directory, applies their configuration to the store, and
//! registers their function imports per hook.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use initforge_config::{ConfigStore, Setter};
use toml::Value;

use crate::descriptor::ModuleDescriptor;
use crate::error::{ModuleError, Result};
use crate::registry::SourceRegistry;
use crate::types::{CustomInitFn, HookFunction};

/// Hook reserved for the single custom-init function.
pub const HOOK_CUSTOM_INIT: &str = "custom_init";
/// Hook whose functions are force-included in the profile.
pub const HOOK_FUNCS: &str = "funcs";
/// Hook whose functions become custom config setters.
pub const HOOK_CONFIG_PROCESSING: &str = "config_processing";

/// One registered import: a hook function, or a setter tracked for
/// name-uniqueness under `config_processing`.
#[derive(Debug, Clone, Copy)]
enum ImportEntry {
    Function(HookFunction),
    Setter(&'static str),
}

impl ImportEntry {
    fn name(&self) -> &'static str {
        match self {
            ImportEntry::Function(function) => function.name,
            ImportEntry::Setter(name) => name,
        }
    }
}

/// An import resolved against a source, before registration.
enum ResolvedImport {
    Function(HookFunction),
    Setter {
        fn_name: &'static str,
        key: String,
        setter: Setter,
    },
    CustomInit(&'static str, CustomInitFn),
}

/// Loads module descriptors and maintains the per-hook import lists.
#[derive(Debug)]
pub struct ModuleLoader {
    registry: SourceRegistry,
    bundled_dir: PathBuf,
    override_dir: PathBuf,
    imports: HashMap<String, Vec<ImportEntry>>,
    custom_init: Option<(&'static str, CustomInitFn)>,
    in_progress: HashSet<String>,
}

impl ModuleLoader {
    pub fn new(registry: SourceRegistry, bundled_dir: PathBuf, override_dir: PathBuf) -> Self {
        Self {
            registry,
            bundled_dir,
            override_dir,
            imports: HashMap::new(),
            custom_init: None,
            in_progress: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SourceRegistry {
        &mut self.registry
    }

    /// The hook functions imported for `hook`, in registration order.
    pub fn hook_functions(&self, hook: &str) -> Vec<HookFunction> {
        self.imports
            .get(hook)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| match entry {
                        ImportEntry::Function(function) => Some(*function),
                        ImportEntry::Setter(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names imported for `hook`, in registration order.
    pub fn hook_names(&self, hook: &str) -> Vec<&'static str> {
        self.imports
            .get(hook)
            .map(|entries| entries.iter().map(ImportEntry::name).collect())
            .unwrap_or_default()
    }

    /// Whether any function is imported for `hook`.
    pub fn has_hook(&self, hook: &str) -> bool {
        self.imports.get(hook).is_some_and(|entries| !entries.is_empty())
    }

    /// The registered custom-init function, if any.
    pub fn custom_init(&self) -> Option<(&'static str, CustomInitFn)> {
        self.custom_init
    }

    /// Remove one import by name, returning whether it was present.
    ///
    /// The registration itself is what masking removes at validation time;
    /// the mask table stays untouched.
    pub fn remove_import(&mut self, hook: &str, name: &str) -> bool {
        let Some(entries) = self.imports.get_mut(hook) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.name() != name);
        before != entries.len()
    }

    /// Load a module by dotted name.
    ///
    /// Already-loaded modules are a no-op, as are modules whose load is
    /// currently in progress (a module re-triggering itself, or a cycle in
    /// the module graph; ordering follows the first visit).
    pub fn load_module(&mut self, store: &mut ConfigStore, name: &str) -> Result<()> {
        if store.list_contains("modules", name) {
            tracing::debug!("Module '{}' already loaded", name);
            return Ok(());
        }
        if self.in_progress.contains(name) {
            tracing::debug!("Module '{}' load already in progress", name);
            return Ok(());
        }

        tracing::info!("Processing module: {}", name);
        self.in_progress.insert(name.to_string());
        let result = self.load_module_inner(store, name);
        self.in_progress.remove(name);
        result?;

        // Marking the module loaded strictly after full processing is the
        // re-entrancy guard for its own load.
        store.set("modules", Value::String(name.to_string()))?;
        Ok(())
    }

    fn load_module_inner(&mut self, store: &mut ConfigStore, name: &str) -> Result<()> {
        let path = self.resolve_descriptor(name)?;
        tracing::debug!("[{}] Module path: {}", name, path.display());
        let descriptor = ModuleDescriptor::load(name, &path)?;
        self.apply_descriptor(store, name, descriptor)
    }

    /// Locate a descriptor in the bundled directory, then the override.
    fn resolve_descriptor(&self, name: &str) -> Result<PathBuf> {
        let subpath = Path::new(&name.replace('.', "/")).with_extension("toml");

        let bundled = self.bundled_dir.join(&subpath);
        if bundled.exists() {
            return Ok(bundled);
        }
        let fallback = self.override_dir.join(&subpath);
        if fallback.exists() {
            return Ok(fallback);
        }
        Err(ModuleError::ModuleNotFound(name.to_string()))
    }

    /// Apply a parsed descriptor: plain keys in document order, then
    /// `imports`, then `custom_parameters`.
    pub fn apply_descriptor(
        &mut self,
        store: &mut ConfigStore,
        name: &str,
        descriptor: ModuleDescriptor,
    ) -> Result<()> {
        for (key, value) in descriptor.settings {
            tracing::debug!("[{}] Setting '{}'", name, key);
            self.apply_value(store, &key, value)?;
        }

        for (hook, entries) in &descriptor.imports {
            let entries = entries.as_table().ok_or_else(|| ModuleError::InvalidSection {
                module: name.to_string(),
                section: format!("imports.{hook}"),
                reason: "expected a table of source -> [functions]".to_string(),
            })?;
            self.process_imports(store, name, hook, entries)?;
        }

        for (parameter, kind) in &descriptor.custom_parameters {
            let kind = kind.as_str().ok_or_else(|| ModuleError::InvalidSection {
                module: name.to_string(),
                section: "custom_parameters".to_string(),
                reason: format!("kind for '{parameter}' must be a string"),
            })?;
            store.register_parameter(parameter, kind)?;
        }

        Ok(())
    }

    /// Apply one top-level configuration value.
    ///
    /// The `modules` key loads the named modules instead of being stored.
    pub fn apply_value(&mut self, store: &mut ConfigStore, key: &str, value: Value) -> Result<()> {
        if key == "modules" {
            let names = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            for entry in names {
                match entry.as_str() {
                    Some(module) => self.load_module(store, module)?,
                    None => {
                        return Err(ModuleError::InvalidSection {
                            module: "config".to_string(),
                            section: "modules".to_string(),
                            reason: format!("module names must be strings, got {entry}"),
                        })
                    }
                }
            }
            return Ok(());
        }
        store.set(key, value)?;
        Ok(())
    }

    /// Apply a user configuration document, same two-pass rules as a module.
    pub fn apply_config(&mut self, store: &mut ConfigStore, origin: &str, text: &str) -> Result<()> {
        let descriptor = ModuleDescriptor::parse(origin, text)?;
        self.apply_descriptor(store, origin, descriptor)
    }

    /// Process one hook's imports: {source identifier: [function names]}.
    fn process_imports(
        &mut self,
        store: &mut ConfigStore,
        module: &str,
        hook: &str,
        entries: &toml::Table,
    ) -> Result<()> {
        tracing::debug!("[{}] Processing imports for hook: {}", module, hook);

        for (source_name, names) in entries {
            let names = function_names(module, hook, names)?;
            let resolved = self.resolve_imports(hook, source_name, &names)?;

            for import in resolved {
                match import {
                    ResolvedImport::CustomInit(name, function) => {
                        if let Some((existing, _)) = self.custom_init {
                            return Err(ModuleError::CustomInitTaken(existing.to_string()));
                        }
                        tracing::info!("Registered custom init function: {}", name);
                        self.custom_init = Some((name, function));
                    }
                    ResolvedImport::Function(function) => {
                        self.check_unique(hook, function.name)?;
                        if hook == HOOK_FUNCS && store.list_contains("binaries", function.name) {
                            return Err(ModuleError::BinaryCollision(function.name.to_string()));
                        }
                        self.imports
                            .entry(hook.to_string())
                            .or_default()
                            .push(ImportEntry::Function(function));
                    }
                    ResolvedImport::Setter { fn_name, key, setter } => {
                        self.check_unique(hook, fn_name)?;
                        store.register_setter(&key, setter);
                        self.imports
                            .entry(hook.to_string())
                            .or_default()
                            .push(ImportEntry::Setter(fn_name));
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up every named function on a source before mutating any state.
    fn resolve_imports(
        &self,
        hook: &str,
        source_name: &str,
        names: &[&str],
    ) -> Result<Vec<ResolvedImport>> {
        let source = self.registry.resolve(source_name)?;
        let missing = |function: &str| ModuleError::FunctionNotFound {
            source_name: source_name.to_string(),
            function: function.to_string(),
        };

        names
            .iter()
            .map(|name| match hook {
                HOOK_CUSTOM_INIT => source
                    .custom_init(name)
                    .map(|(fn_name, function)| ResolvedImport::CustomInit(fn_name, function))
                    .ok_or_else(|| missing(name)),
                HOOK_CONFIG_PROCESSING => source
                    .setter(name)
                    .map(|(fn_name, function)| {
                        let (key, plural) = setter_key(fn_name);
                        let setter = if plural {
                            Setter::Plural(function)
                        } else {
                            Setter::Single(function)
                        };
                        ResolvedImport::Setter { fn_name, key, setter }
                    })
                    .ok_or_else(|| missing(name)),
                _ => source
                    .function(name)
                    .map(ResolvedImport::Function)
                    .ok_or_else(|| missing(name)),
            })
            .collect()
    }

    fn check_unique(&self, hook: &str, name: &str) -> Result<()> {
        let duplicate = self
            .imports
            .get(hook)
            .is_some_and(|entries| entries.iter().any(|entry| entry.name() == name));
        if duplicate {
            return Err(ModuleError::DuplicateFunction {
                hook: hook.to_string(),
                function: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Derive the intercepted config key from a setter's function name.
///
/// `process_<key>` intercepts `<key>`; a `_multi` suffix selects the
/// per-element plural form.
fn setter_key(fn_name: &str) -> (String, bool) {
    let base = fn_name.strip_prefix("process_").unwrap_or(fn_name);
    match base.strip_suffix("_multi") {
        Some(key) => (key.to_string(), true),
        None => (base.to_string(), false),
    }
}

fn function_names<'a>(module: &str, hook: &str, value: &'a Value) -> Result<Vec<&'a str>> {
    let invalid = || ModuleError::InvalidSection {
        module: module.to_string(),
        section: format!("imports.{hook}"),
        reason: "function lists must be arrays of strings".to_string(),
    };

    let items = value.as_array().ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| item.as_str().ok_or_else(invalid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustomInit, FunctionSource, ScriptOutput};
    use std::fs;

    fn hello(_store: &mut ConfigStore) -> anyhow::Result<Option<ScriptOutput>> {
        Ok(Some(ScriptOutput::Text("echo hello".to_string())))
    }

    fn finish(_store: &mut ConfigStore) -> anyhow::Result<Option<ScriptOutput>> {
        Ok(None)
    }

    fn process_greeting(store: &mut ConfigStore, value: Value) -> anyhow::Result<()> {
        store.set("binaries", value)?;
        Ok(())
    }

    fn boot(_store: &mut ConfigStore) -> anyhow::Result<CustomInit> {
        Ok(CustomInit {
            init: ScriptOutput::Text("exec /custom".to_string()),
            body: vec!["#!/bin/sh".to_string(), "poweroff".to_string()],
        })
    }

    fn test_source() -> FunctionSource {
        FunctionSource::new("test.lib")
            .with_function(HookFunction { name: "hello", run: hello })
            .with_function(HookFunction { name: "finish", run: finish })
            .with_setter("process_greeting", process_greeting)
            .with_custom_init("boot", boot)
    }

    fn loader_with(dir: &Path) -> ModuleLoader {
        let mut registry = SourceRegistry::new();
        registry.register(test_source());
        ModuleLoader::new(
            registry,
            dir.to_path_buf(),
            dir.join("override"),
        )
    }

    fn write_module(dir: &Path, name: &str, text: &str) {
        let path = dir.join(Path::new(&name.replace('.', "/")).with_extension("toml"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_load_module_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "alpha",
            "binaries = [ 'sh' ]\n[imports.build_tasks]\n'test.lib' = [ 'hello' ]\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "alpha").unwrap();
        loader.load_module(&mut store, "alpha").unwrap();

        assert_eq!(store.get_list("modules").len(), 1);
        assert_eq!(store.get_list("binaries").len(), 1);
        assert_eq!(loader.hook_functions("build_tasks").len(), 1);
    }

    #[test]
    fn test_missing_module_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();

        let err = loader.load_module(&mut store, "ghost").unwrap_err();
        assert!(matches!(err, ModuleError::ModuleNotFound(_)));
    }

    #[test]
    fn test_override_directory_is_searched_second() {
        let dir = tempfile::tempdir().unwrap();
        write_module(&dir.path().join("override"), "extra.mod", "mknod_cpio = true\n");

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "extra.mod").unwrap();

        assert_eq!(store.get_bool("mknod_cpio"), Some(true));
    }

    #[test]
    fn test_modules_key_loads_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "leaf", "binaries = [ 'mount' ]\n");
        write_module(dir.path(), "root", "modules = [ 'leaf' ]\n");

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "root").unwrap();

        assert!(store.list_contains("modules", "leaf"));
        assert!(store.list_contains("modules", "root"));
        assert!(store.list_contains("binaries", "mount"));
    }

    #[test]
    fn test_module_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "a", "modules = [ 'b' ]\n");
        write_module(dir.path(), "b", "modules = [ 'a' ]\n");

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "a").unwrap();

        // First-visit order: b completes inside a's load.
        let modules: Vec<&str> = store
            .get_list("modules")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(modules, vec!["b", "a"]);
    }

    #[test]
    fn test_settings_apply_before_imports() {
        // The import pass must observe module-local values: the funcs
        // binary-collision check reads `binaries` set by the same module.
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "clash",
            "binaries = [ 'hello' ]\n[imports.funcs]\n'test.lib' = [ 'hello' ]\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        let err = loader.load_module(&mut store, "clash").unwrap_err();
        assert!(matches!(err, ModuleError::BinaryCollision(_)));
    }

    #[test]
    fn test_duplicate_function_in_hook_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "one",
            "[imports.build_tasks]\n'test.lib' = [ 'finish' ]\n",
        );
        write_module(
            dir.path(),
            "two",
            "[imports.build_tasks]\n'test.lib' = [ 'finish' ]\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "one").unwrap();

        let err = loader.load_module(&mut store, "two").unwrap_err();
        assert!(matches!(err, ModuleError::DuplicateFunction { .. }));
    }

    #[test]
    fn test_unknown_function_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "bad",
            "[imports.build_tasks]\n'test.lib' = [ 'no_such_fn' ]\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        let err = loader.load_module(&mut store, "bad").unwrap_err();
        assert!(matches!(err, ModuleError::FunctionNotFound { .. }));
    }

    #[test]
    fn test_unknown_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "bad",
            "[imports.build_tasks]\n'no.such.source' = [ 'hello' ]\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        let err = loader.load_module(&mut store, "bad").unwrap_err();
        assert!(matches!(err, ModuleError::SourceNotFound(_)));
    }

    #[test]
    fn test_custom_init_single_owner() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "first",
            "[imports.custom_init]\n'test.lib' = [ 'boot' ]\n",
        );
        write_module(
            dir.path(),
            "second",
            "[imports.custom_init]\n'test.lib' = [ 'boot' ]\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "first").unwrap();
        assert!(loader.custom_init().is_some());

        let err = loader.load_module(&mut store, "second").unwrap_err();
        assert!(matches!(err, ModuleError::CustomInitTaken(_)));
    }

    #[test]
    fn test_config_processing_registers_setter() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "hookmod",
            "[imports.config_processing]\n'test.lib' = [ 'process_greeting' ]\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "hookmod").unwrap();

        // Future sets of the derived key go through the setter.
        store.set("greeting", Value::String("blkid".into())).unwrap();
        assert!(store.list_contains("binaries", "blkid"));
    }

    #[test]
    fn test_custom_parameters_drain_deferred_queue() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "params",
            "extra_flags = [ 'quiet' ]\n[custom_parameters]\nextra_flags = 'list'\n",
        );

        let mut loader = loader_with(dir.path());
        let mut store = ConfigStore::new();
        loader.load_module(&mut store, "params").unwrap();

        assert!(store.validate().is_ok());
        assert!(store.list_contains("extra_flags", "quiet"));
    }

    #[test]
    fn test_setter_key_derivation() {
        assert_eq!(setter_key("process_mounts"), ("mounts".to_string(), false));
        assert_eq!(setter_key("process_mounts_multi"), ("mounts".to_string(), true));
        assert_eq!(setter_key("plain"), ("plain".to_string(), false));
    }
}
