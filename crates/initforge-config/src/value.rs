//! Parameter kinds and stored values

use std::collections::HashMap;

use once_cell::sync::Lazy;
use toml::Value;

use crate::error::{ConfigError, Result};

/// Closed enumeration of supported parameter kinds.
///
/// Descriptors refer to kinds by name; the mapping is a static table and
/// kind names are never evaluated as code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Ordered list that silently skips duplicate insertions.
    DedupList,
    /// Ordered list that keeps duplicates.
    List,
    /// String-keyed mapping with shallow last-write-wins merging.
    Table,
    Bool,
    Int,
    Float,
    /// Raw value stored as-is, overwritten on every set.
    Opaque,
}

/// Kind-name lookup table, built once at process start.
static KIND_NAMES: Lazy<HashMap<&'static str, ParamKind>> = Lazy::new(|| {
    HashMap::from([
        ("dedup-list", ParamKind::DedupList),
        ("list", ParamKind::List),
        ("mapping", ParamKind::Table),
        ("bool", ParamKind::Bool),
        ("int", ParamKind::Int),
        ("float", ParamKind::Float),
    ])
});

impl ParamKind {
    /// Resolve a descriptor kind name, or `None` if it is not a known kind.
    pub fn from_name(name: &str) -> Option<Self> {
        KIND_NAMES.get(name).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::DedupList => "dedup-list",
            ParamKind::List => "list",
            ParamKind::Table => "mapping",
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Opaque => "opaque",
        }
    }

    /// The initial value installed when a parameter of this kind is registered.
    pub fn default_value(&self) -> ConfigValue {
        match self {
            ParamKind::DedupList => ConfigValue::DedupList(Vec::new()),
            ParamKind::List => ConfigValue::List(Vec::new()),
            ParamKind::Table => ConfigValue::Table(toml::Table::new()),
            ParamKind::Bool => ConfigValue::Bool(false),
            ParamKind::Int => ConfigValue::Int(0),
            ParamKind::Float => ConfigValue::Float(0.0),
            ParamKind::Opaque => ConfigValue::Opaque(None),
        }
    }
}

/// A stored configuration value, tagged by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    DedupList(Vec<Value>),
    List(Vec<Value>),
    Table(toml::Table),
    Bool(bool),
    Int(i64),
    Float(f64),
    Opaque(Option<Value>),
}

impl ConfigValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ConfigValue::DedupList(_) => ParamKind::DedupList,
            ConfigValue::List(_) => ParamKind::List,
            ConfigValue::Table(_) => ParamKind::Table,
            ConfigValue::Bool(_) => ParamKind::Bool,
            ConfigValue::Int(_) => ParamKind::Int,
            ConfigValue::Float(_) => ParamKind::Float,
            ConfigValue::Opaque(_) => ParamKind::Opaque,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Opaque(Some(Value::Boolean(b))) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::Opaque(Some(Value::Integer(i))) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Opaque(Some(Value::Float(f))) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Opaque(Some(Value::String(s))) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            ConfigValue::DedupList(items) | ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&toml::Table> {
        match self {
            ConfigValue::Table(table) => Some(table),
            _ => None,
        }
    }
}

/// Coerce a raw value to a scalar kind.
///
/// Booleans accept bools, integers and the usual string spellings; integers
/// accept floats by truncation and numeric strings; floats accept integers
/// and numeric strings. Anything else is a [`ConfigError::Coercion`].
pub fn coerce_scalar(key: &str, kind: ParamKind, value: Value) -> Result<ConfigValue> {
    let fail = |value: &Value| ConfigError::Coercion {
        key: key.to_string(),
        kind: kind.as_str(),
        value: value.to_string(),
    };

    match kind {
        ParamKind::Bool => match &value {
            Value::Boolean(b) => Ok(ConfigValue::Bool(*b)),
            Value::Integer(i) => Ok(ConfigValue::Bool(*i != 0)),
            Value::String(s) => match s.as_str() {
                "true" | "1" | "yes" => Ok(ConfigValue::Bool(true)),
                "false" | "0" | "no" => Ok(ConfigValue::Bool(false)),
                _ => Err(fail(&value)),
            },
            _ => Err(fail(&value)),
        },
        ParamKind::Int => match &value {
            Value::Integer(i) => Ok(ConfigValue::Int(*i)),
            Value::Float(f) => Ok(ConfigValue::Int(*f as i64)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(ConfigValue::Int)
                .map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        ParamKind::Float => match &value {
            Value::Float(f) => Ok(ConfigValue::Float(*f)),
            Value::Integer(i) => Ok(ConfigValue::Float(*i as f64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(ConfigValue::Float)
                .map_err(|_| fail(&value)),
            _ => Err(fail(&value)),
        },
        _ => Err(fail(&value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_name_round_trip() {
        for name in ["dedup-list", "list", "mapping", "bool", "int", "float"] {
            let kind = ParamKind::from_name(name).unwrap();
            assert_eq!(kind.as_str(), name);
        }
        assert_eq!(ParamKind::from_name("str"), None);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(
            ParamKind::DedupList.default_value(),
            ConfigValue::DedupList(Vec::new())
        );
        assert_eq!(ParamKind::Bool.default_value(), ConfigValue::Bool(false));
        assert_eq!(ParamKind::Int.default_value(), ConfigValue::Int(0));
        assert_eq!(ParamKind::Float.default_value(), ConfigValue::Float(0.0));
        assert_eq!(ParamKind::Opaque.default_value(), ConfigValue::Opaque(None));
    }

    #[test]
    fn test_bool_coercion() {
        let coerced = coerce_scalar("k", ParamKind::Bool, Value::Integer(3)).unwrap();
        assert_eq!(coerced, ConfigValue::Bool(true));

        let coerced =
            coerce_scalar("k", ParamKind::Bool, Value::String("false".into())).unwrap();
        assert_eq!(coerced, ConfigValue::Bool(false));

        assert!(coerce_scalar("k", ParamKind::Bool, Value::String("maybe".into())).is_err());
    }

    #[test]
    fn test_int_coercion() {
        let coerced = coerce_scalar("k", ParamKind::Int, Value::Float(2.9)).unwrap();
        assert_eq!(coerced, ConfigValue::Int(2));

        let coerced = coerce_scalar("k", ParamKind::Int, Value::String("42".into())).unwrap();
        assert_eq!(coerced, ConfigValue::Int(42));

        let err = coerce_scalar("size", ParamKind::Int, Value::String("big".into()));
        assert!(matches!(err, Err(ConfigError::Coercion { .. })));
    }

    #[test]
    fn test_float_coercion() {
        let coerced = coerce_scalar("k", ParamKind::Float, Value::Integer(2)).unwrap();
        assert_eq!(coerced, ConfigValue::Float(2.0));
    }
}
