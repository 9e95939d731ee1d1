//! Hook function types and function sources

use std::collections::HashMap;
use std::fmt;

use initforge_config::{ConfigStore, SetterFn};

/// Textual output produced by a hook function.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutput {
    /// A single script fragment.
    Text(String),
    /// An ordered sequence of fragments.
    Lines(Vec<String>),
}

impl ScriptOutput {
    /// Collapse a one-element sequence to its single fragment.
    pub fn collapse(self) -> ScriptOutput {
        match self {
            ScriptOutput::Lines(mut lines) if lines.len() == 1 => {
                ScriptOutput::Text(lines.remove(0))
            }
            other => other,
        }
    }

    /// The output as a flat list of lines.
    pub fn lines(&self) -> Vec<String> {
        match self {
            ScriptOutput::Text(text) => vec![text.clone()],
            ScriptOutput::Lines(lines) => lines.clone(),
        }
    }
}

impl From<&str> for ScriptOutput {
    fn from(text: &str) -> Self {
        ScriptOutput::Text(text.to_string())
    }
}

/// A hook function body.
///
/// Functions receive the whole store and produce nothing, a single
/// fragment, or an ordered sequence of fragments.
pub type HookFn = fn(&mut ConfigStore) -> anyhow::Result<Option<ScriptOutput>>;

/// A named hook function.
#[derive(Clone, Copy)]
pub struct HookFunction {
    pub name: &'static str,
    pub run: HookFn,
}

impl fmt::Debug for HookFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookFunction").field("name", &self.name).finish()
    }
}

/// Output of a custom-init function: the lines spliced into the init
/// script plus the body of the standalone custom-init file.
#[derive(Debug, Clone)]
pub struct CustomInit {
    pub init: ScriptOutput,
    pub body: Vec<String>,
}

/// A custom-init function, replacing the standard init phase sequence.
pub type CustomInitFn = fn(&mut ConfigStore) -> anyhow::Result<CustomInit>;

/// A named bundle of functions a descriptor can import from.
pub struct FunctionSource {
    name: String,
    functions: HashMap<&'static str, HookFunction>,
    setters: HashMap<&'static str, SetterFn>,
    init_functions: HashMap<&'static str, CustomInitFn>,
}

impl FunctionSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
            setters: HashMap::new(),
            init_functions: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a hook function, builder style.
    pub fn with_function(mut self, function: HookFunction) -> Self {
        self.functions.insert(function.name, function);
        self
    }

    /// Add a config-processing setter, builder style.
    pub fn with_setter(mut self, name: &'static str, setter: SetterFn) -> Self {
        self.setters.insert(name, setter);
        self
    }

    /// Add a custom-init function, builder style.
    pub fn with_custom_init(mut self, name: &'static str, function: CustomInitFn) -> Self {
        self.init_functions.insert(name, function);
        self
    }

    pub fn function(&self, name: &str) -> Option<HookFunction> {
        self.functions.get(name).copied()
    }

    pub fn setter(&self, name: &str) -> Option<(&'static str, SetterFn)> {
        self.setters.get_key_value(name).map(|(k, v)| (*k, *v))
    }

    pub fn custom_init(&self, name: &str) -> Option<(&'static str, CustomInitFn)> {
        self.init_functions.get_key_value(name).map(|(k, v)| (*k, *v))
    }
}

impl fmt::Debug for FunctionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSource")
            .field("name", &self.name)
            .field("functions", &self.functions.keys())
            .field("setters", &self.setters.keys())
            .field("init_functions", &self.init_functions.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(_store: &mut ConfigStore) -> anyhow::Result<Option<ScriptOutput>> {
        Ok(None)
    }

    #[test]
    fn test_collapse_single_element_sequence() {
        let output = ScriptOutput::Lines(vec!["echo hi".to_string()]);
        assert_eq!(output.collapse(), ScriptOutput::Text("echo hi".to_string()));
    }

    #[test]
    fn test_collapse_keeps_longer_sequences() {
        let output = ScriptOutput::Lines(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(output.clone().collapse(), output);
    }

    #[test]
    fn test_source_lookup() {
        let source = FunctionSource::new("base.base")
            .with_function(HookFunction { name: "nop", run: nop });

        assert!(source.function("nop").is_some());
        assert!(source.function("missing").is_none());
        assert!(source.setter("nop").is_none());
    }
}
