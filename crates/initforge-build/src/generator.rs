//! The build orchestrator
//!
//! Owns the configuration store, the module loader, and the named-function
//! table, and drives the fixed phase order: `build_pre`, `build_tasks`,
//! init generation, `build_final`, artifact writes, `pack`, `checks`,
//! `tests`. Hook functions run one at a time in registration order; the
//! textual ordering of the generated scripts is observable and must not
//! change between runs.

use std::path::PathBuf;

use initforge_common::banner;
use initforge_common::fs::write_script;
use initforge_config::ConfigStore;
use initforge_modules::{HookFunction, ModuleLoader, ScriptOutput, HOOK_FUNCS};
use toml::Value;

use crate::error::{BuildError, Result};
use crate::hooks;

const DEFAULT_SHEBANG: &str = "#!/bin/sh";

/// Assembles an initramfs from loaded modules and user configuration.
#[derive(Debug)]
pub struct InitramfsGenerator {
    store: ConfigStore,
    loader: ModuleLoader,
    /// Named functions destined for the profile, in insertion order.
    included: Vec<(String, ScriptOutput)>,
    custom_init_body: Option<Vec<String>>,
}

impl InitramfsGenerator {
    pub fn new(loader: ModuleLoader) -> Self {
        Self {
            store: ConfigStore::new(),
            loader,
            included: Vec::new(),
            custom_init_body: None,
        }
    }

    /// A generator with the built-in function sources registered.
    pub fn standard(bundled_dir: PathBuf, override_dir: PathBuf) -> Self {
        Self::new(ModuleLoader::new(
            crate::sources::builtin_registry(),
            bundled_dir,
            override_dir,
        ))
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConfigStore {
        &mut self.store
    }

    pub fn loader_mut(&mut self) -> &mut ModuleLoader {
        &mut self.loader
    }

    /// Load one module by dotted name.
    pub fn load_module(&mut self, name: &str) -> Result<()> {
        self.loader.load_module(&mut self.store, name)?;
        Ok(())
    }

    /// Apply a user configuration document.
    pub fn apply_config(&mut self, origin: &str, text: &str) -> Result<()> {
        self.loader.apply_config(&mut self.store, origin, text)?;
        Ok(())
    }

    /// Declare a mask for one function under one hook.
    ///
    /// Purely declarative: the import list is untouched until validation,
    /// and the runtime check in [`run_hook`](Self::run_hook) covers masks
    /// declared between validation and execution.
    pub fn mask_function(&mut self, hook: &str, name: &str) -> Result<()> {
        let mut masked: Vec<Value> = self
            .store
            .get_table("masks")
            .and_then(|table| table.get(hook))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if !masked.iter().any(|entry| entry.as_str() == Some(name)) {
            masked.push(Value::String(name.to_string()));
        }

        let mut update = toml::Table::new();
        update.insert(hook.to_string(), Value::Array(masked));
        self.store.set("masks", Value::Table(update))?;
        tracing::info!("[{}] Masked function: {}", hook, name);
        Ok(())
    }

    fn is_masked(&self, hook: &str, name: &str) -> bool {
        self.store
            .get_table("masks")
            .and_then(|table| table.get(hook))
            .and_then(Value::as_array)
            .is_some_and(|masked| masked.iter().any(|entry| entry.as_str() == Some(name)))
    }

    /// Drop masked functions from the import lists.
    ///
    /// A mask that matches nothing is a warning, never an error.
    fn verify_mask(&mut self) {
        let Some(masks) = self.store.get_table("masks").cloned() else {
            return;
        };
        for (hook, masked) in &masks {
            let Some(masked) = masked.as_array() else {
                continue;
            };
            for name in masked.iter().filter_map(Value::as_str) {
                if self.loader.remove_import(hook, name) {
                    tracing::warn!("[{}] Removing masked function: {}", hook, name);
                } else {
                    tracing::warn!("[{}] Mask matches no imported function: {}", hook, name);
                }
            }
        }
    }

    /// Validate the configuration and apply declared masks.
    pub fn validate(&mut self) -> Result<()> {
        self.store.validate()?;
        self.verify_mask();
        self.store.set("validated", Value::Boolean(true))?;
        Ok(())
    }

    /// Invoke one hook function and return its output fragment.
    ///
    /// Single-fragment output is inlined unless force-included; everything
    /// else is registered in the named-function table and referenced by
    /// name.
    pub fn run_function(
        &mut self,
        hook: &str,
        function: HookFunction,
        force_include: bool,
    ) -> Result<Option<String>> {
        tracing::debug!("[{}] Running function: {}", hook, function.name);
        let output = (function.run)(&mut self.store).map_err(|source| BuildError::Hook {
            hook: hook.to_string(),
            function: function.name.to_string(),
            source,
        })?;

        let Some(output) = output else {
            return Ok(None);
        };
        match output.collapse() {
            ScriptOutput::Text(text) if !force_include => Ok(Some(text)),
            body => {
                self.include_function(function.name, body)?;
                Ok(Some(function.name.to_string()))
            }
        }
    }

    fn include_function(&mut self, name: &str, body: ScriptOutput) -> Result<()> {
        if self.included.iter().any(|(existing, _)| existing == name) {
            return Err(BuildError::FunctionCollision(name.to_string()));
        }
        if self.store.list_contains("binaries", name) {
            return Err(BuildError::BinaryCollision(name.to_string()));
        }
        tracing::debug!("Including function: {}", name);
        self.included.push((name.to_string(), body));
        Ok(())
    }

    /// Run every unmasked function of a hook, in registration order.
    pub fn run_hook(&mut self, hook: &str) -> Result<Vec<String>> {
        let force_include = hook == HOOK_FUNCS;
        let mut out = Vec::new();
        for function in self.loader.hook_functions(hook) {
            if self.is_masked(hook, function.name) {
                tracing::warn!("[{}] Skipping masked function: {}", hook, function.name);
                continue;
            }
            if let Some(fragment) = self.run_function(hook, function, force_include)? {
                out.push(fragment);
            }
        }
        Ok(out)
    }

    /// Run an init hook, prefixing a section header when output exists.
    fn run_init_hook(&mut self, hook: &str) -> Result<Vec<String>> {
        let mut out = self.run_hook(hook)?;
        if !out.is_empty() {
            out.insert(0, format!("\n# Begin {hook}"));
        }
        Ok(out)
    }

    fn shebang(&self) -> String {
        self.store
            .get_str("shebang")
            .unwrap_or(DEFAULT_SHEBANG)
            .to_string()
    }

    /// Assemble the init script lines.
    ///
    /// A registered custom-init function replaces the standard phase
    /// sequence only when a destination file for its body is configured.
    pub fn generate_init(&mut self) -> Result<Vec<String>> {
        let mut init = vec![self.shebang()];

        // Run force-included functions first so every later phase can
        // reference them; their fragments are the names already destined
        // for the profile.
        self.run_hook(HOOK_FUNCS)?;

        init.extend(self.run_init_hook(hooks::INIT_PRE)?);
        init.push(banner());

        match (self.loader.custom_init(), self.store.get_str("custom_init_file")) {
            (Some((name, function)), Some(_)) => {
                tracing::info!("Using custom init function: {}", name);
                init.push("\n# !!custom_init".to_string());
                let custom = function(&mut self.store).map_err(|source| BuildError::Hook {
                    hook: "custom_init".to_string(),
                    function: name.to_string(),
                    source,
                })?;
                init.extend(custom.init.lines());

                let mut body = custom.body;
                // The banner references the profile, so it is only spliced
                // in when named functions exist for the profile to define.
                if !self.included.is_empty() {
                    body.insert(body.len().min(2), banner());
                }
                self.custom_init_body = Some(body);
            }
            _ => {
                for hook in hooks::INIT_SEQUENCE {
                    init.extend(self.run_init_hook(hook)?);
                }
            }
        }

        init.extend(self.run_init_hook(hooks::INIT_FINAL)?);
        init.push("\n\n# END INIT".to_string());
        Ok(init)
    }

    /// Assemble the profile script, present only when functions were
    /// registered by name.
    pub fn generate_profile(&self) -> Option<Vec<String>> {
        if self.included.is_empty() {
            return None;
        }

        let shebang = self.shebang();
        // Interpreter word only, without shebang arguments.
        let interpreter = shebang.split(' ').next().unwrap_or(DEFAULT_SHEBANG);
        let mut profile = vec![interpreter.to_string(), banner()];

        let paths: Vec<&str> = self
            .store
            .get_list("library_paths")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        profile.push(format!("export LD_LIBRARY_PATH={}", paths.join(":")));

        for (name, body) in &self.included {
            profile.push(format!("\n\n{name}() {{"));
            for line in body.lines() {
                profile.push(format!("    {line}"));
            }
            profile.push("}".to_string());
        }
        Some(profile)
    }

    fn build_dir(&self) -> Result<PathBuf> {
        self.store
            .get_path("build_dir")
            .ok_or(BuildError::MissingConfig("build_dir"))
    }

    /// Write the generated scripts into the build directory.
    fn write_artifacts(&self, init: &[String]) -> Result<()> {
        let build_dir = self.build_dir()?;

        write_script(&build_dir.join("init"), init, 0o755)?;
        tracing::info!("Wrote init script: {}", build_dir.join("init").display());

        if let Some(profile) = self.generate_profile() {
            let path = build_dir.join("etc/profile");
            write_script(&path, &profile, 0o755)?;
            tracing::info!("Wrote profile: {}", path.display());
        }

        if let Some(body) = &self.custom_init_body {
            let file = self
                .store
                .get_str("custom_init_file")
                .ok_or(BuildError::MissingConfig("custom_init_file"))?;
            let path = build_dir.join(file.trim_start_matches('/'));
            write_script(&path, body, 0o755)?;
            tracing::info!("Wrote custom init file: {}", path.display());
        }
        Ok(())
    }

    /// Run the whole pipeline.
    pub fn build(&mut self) -> Result<()> {
        self.validate()?;

        self.run_hook(hooks::BUILD_PRE)?;
        self.run_hook(hooks::BUILD_TASKS)?;

        let init = self.generate_init()?;

        self.run_hook(hooks::BUILD_FINAL)?;
        self.write_artifacts(&init)?;

        if self.loader.has_hook(hooks::PACK) {
            self.run_hook(hooks::PACK)?;
        } else {
            tracing::warn!(
                "No pack functions registered, the build directory was not archived: {}",
                self.build_dir()?.display()
            );
        }

        if self.run_hook(hooks::CHECKS)?.is_empty() {
            tracing::warn!("No check functions registered");
        }
        if self.run_hook(hooks::TESTS)?.is_empty() {
            tracing::debug!("No test functions registered");
        }
        Ok(())
    }
}
