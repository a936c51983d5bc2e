use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form step configuration, as stored on the flow definition.
pub type Config = serde_json::Map<String, Value>;

/// Type-specific payload produced by a step executor.
pub type Output = serde_json::Map<String, Value>;

/// Declared type of a configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// One entry of a step type's configuration schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType, description: impl Into<String>) -> Self {
        Self {
            field_type,
            required: false,
            default: Value::Null,
            description: description.into(),
            options: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }
}

/// Configuration schema exposed by every step executor.
///
/// The engine only uses it to check that required fields are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of required fields absent (or null) in `config`.
    pub fn missing_required(&self, config: &Config) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(name, spec)| {
                spec.required && config.get(name.as_str()).map_or(true, Value::is_null)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Unknown fields are ignored; values are never normalized.
    pub fn validate(&self, config: &Config) -> bool {
        self.missing_required(config).is_empty()
    }
}

/// Typed lookups with defaults over a config or output map
pub trait ConfigExt {
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;
    fn u64_or(&self, key: &str, default: u64) -> u64;
    fn bool_or(&self, key: &str, default: bool) -> bool;
    fn strings_or(&self, key: &str, default: &[&str]) -> Vec<String>;
}

impl ConfigExt for serde_json::Map<String, Value> {
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn strings_or(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }
}
