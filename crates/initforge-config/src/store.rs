//! The configuration store
//!
//! One store instance holds the merged configuration of every loaded module
//! plus the user config. Custom setters registered through
//! `config_processing` imports intercept `set` calls for their key before
//! any merge rule runs.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use toml::Value;

use crate::error::{ConfigError, Result};
use crate::value::{coerce_scalar, ConfigValue, ParamKind};

/// A custom setter invoked in place of the normal merge rules.
pub type SetterFn = fn(&mut ConfigStore, Value) -> anyhow::Result<()>;

/// How a custom setter consumes incoming values.
#[derive(Debug, Clone, Copy)]
pub enum Setter {
    /// Receives the raw value exactly as submitted.
    Single(SetterFn),
    /// Receives one call per element when the value is an array.
    Plural(SetterFn),
}

/// Built-in parameters, fixed at process start.
static BUILTIN_PARAMETERS: Lazy<HashMap<&'static str, ParamKind>> = Lazy::new(|| {
    HashMap::from([
        ("modules", ParamKind::DedupList),
        ("validated", ParamKind::Bool),
        ("masks", ParamKind::Table),
        ("binaries", ParamKind::DedupList),
        ("dependencies", ParamKind::DedupList),
        ("library_paths", ParamKind::DedupList),
        ("nodes", ParamKind::Table),
        ("mknod_cpio", ParamKind::Bool),
        ("shebang", ParamKind::Opaque),
        ("build_dir", ParamKind::Opaque),
        ("out_dir", ParamKind::Opaque),
        ("out_file", ParamKind::Opaque),
        ("custom_init_file", ParamKind::Opaque),
        ("test_arch", ParamKind::Opaque),
        ("test_cpu", ParamKind::Opaque),
        ("test_memory", ParamKind::Opaque),
        ("test_cmdline", ParamKind::Opaque),
        ("test_kernel", ParamKind::Opaque),
        ("test_rootfs", ParamKind::Opaque),
        ("test_flag", ParamKind::Opaque),
        ("test_timeout", ParamKind::Int),
        ("qemu_bool_args", ParamKind::List),
    ])
});

/// Non-data keys that are stored directly and never queued.
const RESERVED_KEYS: &[&str] = &["log_level"];

/// Typed key/value store with per-kind merge rules and deferred values.
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: HashMap<String, ConfigValue>,
    custom_kinds: HashMap<String, ParamKind>,
    deferred: HashMap<String, VecDeque<Value>>,
    setters: HashMap<String, Setter>,
}

impl ConfigStore {
    /// Create a store with every built-in parameter at its default.
    pub fn new() -> Self {
        let mut values = HashMap::new();
        for (name, kind) in BUILTIN_PARAMETERS.iter() {
            values.insert(name.to_string(), kind.default_value());
        }
        Self {
            values,
            custom_kinds: HashMap::new(),
            deferred: HashMap::new(),
            setters: HashMap::new(),
        }
    }

    /// The kind assigned to `key`, builtin first, then custom.
    pub fn kind_of(&self, key: &str) -> Option<ParamKind> {
        BUILTIN_PARAMETERS
            .get(key)
            .copied()
            .or_else(|| self.custom_kinds.get(key).copied())
    }

    /// Submit a value for `key`, applying the merge rule for its kind.
    ///
    /// Keys without an assigned kind have the value queued until
    /// [`register_parameter`](Self::register_parameter) resolves it.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if let Some(setter) = self.setters.get(key).copied() {
            return self.run_setter(key, setter, value);
        }

        let Some(kind) = self.kind_of(key) else {
            if RESERVED_KEYS.contains(&key) {
                self.values
                    .insert(key.to_string(), ConfigValue::Opaque(Some(value)));
                return Ok(());
            }
            tracing::debug!("Queueing value for unknown parameter '{}'", key);
            self.deferred.entry(key.to_string()).or_default().push_back(value);
            return Ok(());
        };

        match kind {
            ParamKind::DedupList => self.append(key, value, true),
            ParamKind::List => self.append(key, value, false),
            ParamKind::Table => self.merge_table(key, value),
            ParamKind::Opaque => {
                self.values
                    .insert(key.to_string(), ConfigValue::Opaque(Some(value)));
                Ok(())
            }
            scalar => {
                let coerced = coerce_scalar(key, scalar, value)?;
                self.values.insert(key.to_string(), coerced);
                Ok(())
            }
        }
    }

    fn run_setter(&mut self, key: &str, setter: Setter, value: Value) -> Result<()> {
        let wrap = |source| ConfigError::Setter {
            key: key.to_string(),
            source,
        };
        match setter {
            Setter::Single(func) => {
                tracing::debug!("[{}] Using custom setter", key);
                func(self, value).map_err(wrap)
            }
            Setter::Plural(func) => {
                tracing::debug!("[{}] Using custom plural setter", key);
                match value {
                    Value::Array(items) => {
                        for item in items {
                            func(self, item).map_err(wrap)?;
                        }
                        Ok(())
                    }
                    single => func(self, single).map_err(wrap),
                }
            }
        }
    }

    /// Append to a list-kind key, flattening array values.
    fn append(&mut self, key: &str, value: Value, dedup: bool) -> Result<()> {
        let items = match value {
            Value::Array(items) => items,
            single => vec![single],
        };

        let entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| {
                if dedup {
                    ConfigValue::DedupList(Vec::new())
                } else {
                    ConfigValue::List(Vec::new())
                }
            });
        let (ConfigValue::DedupList(list) | ConfigValue::List(list)) = entry else {
            return Err(ConfigError::Coercion {
                key: key.to_string(),
                kind: if dedup { "dedup-list" } else { "list" },
                value: "non-list stored value".to_string(),
            });
        };

        for item in items {
            if dedup && list.contains(&item) {
                tracing::debug!("[{}] Skipping duplicate list entry: {}", key, item);
                continue;
            }
            list.push(item);
        }
        Ok(())
    }

    /// Shallow-merge into a table-kind key: new sub-keys are added,
    /// overlapping sub-keys are overwritten, missing sub-keys are retained.
    fn merge_table(&mut self, key: &str, value: Value) -> Result<()> {
        let Value::Table(incoming) = value else {
            return Err(ConfigError::Coercion {
                key: key.to_string(),
                kind: "mapping",
                value: value.to_string(),
            });
        };

        match self.values.get_mut(key) {
            Some(ConfigValue::Table(existing)) => {
                tracing::debug!("Updating mapping '{}'", key);
                existing.extend(incoming);
            }
            _ => {
                tracing::debug!("Setting mapping '{}'", key);
                self.values.insert(key.to_string(), ConfigValue::Table(incoming));
            }
        }
        Ok(())
    }

    /// Register a custom parameter with the named kind.
    ///
    /// The first registration installs the kind's default value and replays
    /// any queued values for the key in arrival order. Re-registration with
    /// the same kind is a no-op; a different kind is fatal.
    pub fn register_parameter(&mut self, name: &str, kind_name: &str) -> Result<()> {
        let kind = ParamKind::from_name(kind_name).ok_or_else(|| ConfigError::UnknownKind {
            name: name.to_string(),
            kind: kind_name.to_string(),
        })?;

        if let Some(existing) = self.kind_of(name) {
            if existing == kind {
                tracing::debug!("Parameter '{}' already registered as {}", name, kind.as_str());
                return Ok(());
            }
            return Err(ConfigError::KindConflict {
                name: name.to_string(),
                existing: existing.as_str(),
                requested: kind.as_str(),
            });
        }

        tracing::debug!("Registered parameter '{}' with kind {}", name, kind.as_str());
        self.custom_kinds.insert(name.to_string(), kind);
        self.values.insert(name.to_string(), kind.default_value());

        if let Some(queue) = self.deferred.remove(name) {
            tracing::debug!("Replaying {} queued values for '{}'", queue.len(), name);
            for value in queue {
                self.set(name, value)?;
            }
        }
        Ok(())
    }

    /// Register a custom setter for `key`, replacing the merge rules.
    pub fn register_setter(&mut self, key: &str, setter: Setter) {
        tracing::debug!("Registered custom setter for '{}'", key);
        self.setters.insert(key.to_string(), setter);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Fetch the stored value for `key` without side effects.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigValue::as_int)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_str)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get_str(key).map(PathBuf::from)
    }

    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key).and_then(ConfigValue::as_list).unwrap_or(&[])
    }

    pub fn get_table(&self, key: &str) -> Option<&toml::Table> {
        self.get(key).and_then(ConfigValue::as_table)
    }

    /// Whether a string element is present in a list-kind key.
    pub fn list_contains(&self, key: &str, needle: &str) -> bool {
        self.get_list(key)
            .iter()
            .any(|item| item.as_str() == Some(needle))
    }

    /// Fail if any key still has queued values without a resolved kind.
    pub fn validate(&self) -> Result<()> {
        if self.deferred.is_empty() {
            return Ok(());
        }
        let mut keys: Vec<String> = self.deferred.keys().cloned().collect();
        keys.sort();
        Err(ConfigError::UnprocessedValues(keys))
    }
}
