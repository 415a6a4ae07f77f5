/// Default-valued maps from domain-object names to values
use indexmap::IndexMap;
use std::fmt;

use crate::value::Value;

/// Kind of domain object a map, collection or partition ranges over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Sequence,
    Motif,
    Module,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MemberKind::Sequence => "sequence",
            MemberKind::Motif => "motif",
            MemberKind::Module => "module",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyedMap {
    pub name: String,
    kind: MemberKind,
    values: IndexMap<String, Value>,
    default: Value,
}

impl KeyedMap {
    pub fn new(name: impl Into<String>, kind: MemberKind, default: impl Into<Value>) -> Self {
        KeyedMap {
            name: name.into(),
            kind,
            values: IndexMap::new(),
            default: default.into(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Value for `key`, falling back to the default
    pub fn get(&self, key: &str) -> &Value {
        self.values.get(key).unwrap_or(&self.default)
    }

    /// Explicitly assigned value, if any
    pub fn explicit(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).as_number()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn set_default(&mut self, value: impl Into<Value>) {
        self.default = value.into();
    }
}
