use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::record::{get_path, set_path, PathError};

/// Declarative mapping of one legacy field onto one target field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub rule_id: String,
    #[serde(default)]
    pub source_path: Option<String>,
    pub target_path: String,
    pub mapping_type: MappingType,
    #[serde(default)]
    pub function: Option<TransformFn>,
    /// Used when the source is absent or null; also the payload of `constant` mappings.
    /// An explicit `default: null` is kept as `Some(Null)`.
    #[serde(default, deserialize_with = "explicit_value")]
    pub default: Option<Value>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    100
}

fn explicit_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Types of mappings that can be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    /// Copy the source value unchanged
    Copy,
    /// Pass the source value through `function`
    Transform,
    /// Write `default` regardless of the source
    Constant,
}

/// Built-in value functions available to `transform` mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformFn {
    ToString,
    ParseInteger,
    Lowercase,
    Trim,
    LanguageName,
    CountryName,
    WrapList,
}

/// Condition for conditional mappings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field_path: String,
    pub condition_type: ConditionType,
    #[serde(default)]
    pub expected_value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    FieldExists,
    FieldAbsent,
    ValueEquals,
    ValueNotEquals,
}

/// Record of a mapping that was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMapping {
    pub rule_id: String,
    pub target_path: String,
    pub new_value: Value,
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Mapping '{rule_id}' has no source_path")]
    MissingSourcePath { rule_id: String },

    #[error("Mapping '{rule_id}': source field '{path}' is missing")]
    MissingSource { rule_id: String, path: String },

    #[error("Mapping '{rule_id}': {function:?} failed on '{path}': {reason}")]
    TransformFailed {
        rule_id: String,
        path: String,
        function: TransformFn,
        reason: String,
    },

    #[error("Mapping '{rule_id}' has no function")]
    MissingFunction { rule_id: String },

    #[error("Mapping '{rule_id}': {source}")]
    Write {
        rule_id: String,
        #[source]
        source: PathError,
    },
}

impl MappingError {
    pub fn rule_id(&self) -> &str {
        match self {
            MappingError::MissingSourcePath { rule_id }
            | MappingError::MissingSource { rule_id, .. }
            | MappingError::TransformFailed { rule_id, .. }
            | MappingError::MissingFunction { rule_id }
            | MappingError::Write { rule_id, .. } => rule_id,
        }
    }

    /// The field path the failure refers to, when there is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            MappingError::MissingSource { path, .. } | MappingError::TransformFailed { path, .. } => {
                Some(path.as_str())
            }
            _ => None,
        }
    }
}

impl FieldMapping {
    pub fn new(rule_id: &str, source_path: &str, target_path: &str, mapping_type: MappingType) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            source_path: Some(source_path.to_string()),
            target_path: target_path.to_string(),
            mapping_type,
            function: None,
            default: None,
            condition: None,
            priority: default_priority(),
        }
    }

    pub fn constant(rule_id: &str, target_path: &str, value: Value) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            source_path: None,
            target_path: target_path.to_string(),
            mapping_type: MappingType::Constant,
            function: None,
            default: Some(value),
            condition: None,
            priority: default_priority(),
        }
    }

    pub fn with_function(mut self, function: TransformFn) -> Self {
        self.function = Some(function);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Check if the mapping's condition is satisfied
    pub fn condition_satisfied(&self, input: &Value) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |condition| condition.is_satisfied(input))
    }

    /// Evaluate the mapping against `input` and write the result into `output`.
    ///
    /// Returns `Ok(None)` when the condition skipped the mapping.
    pub fn apply(&self, input: &Value, output: &mut Value) -> Result<Option<AppliedMapping>, MappingError> {
        if !self.condition_satisfied(input) {
            return Ok(None);
        }

        let value = match self.mapping_type {
            MappingType::Constant => self.default.clone().unwrap_or(Value::Null),
            MappingType::Copy => self.resolve_source(input)?,
            MappingType::Transform => {
                let function = self.function.ok_or_else(|| MappingError::MissingFunction {
                    rule_id: self.rule_id.clone(),
                })?;
                let source = self.resolve_source(input)?;
                function.apply(&source).map_err(|reason| MappingError::TransformFailed {
                    rule_id: self.rule_id.clone(),
                    path: self.source_path.clone().unwrap_or_default(),
                    function,
                    reason,
                })?
            }
        };

        set_path(output, &self.target_path, value.clone()).map_err(|source| MappingError::Write {
            rule_id: self.rule_id.clone(),
            source,
        })?;

        Ok(Some(AppliedMapping {
            rule_id: self.rule_id.clone(),
            target_path: self.target_path.clone(),
            new_value: value,
        }))
    }

    fn resolve_source(&self, input: &Value) -> Result<Value, MappingError> {
        let path = self
            .source_path
            .as_deref()
            .ok_or_else(|| MappingError::MissingSourcePath {
                rule_id: self.rule_id.clone(),
            })?;

        match (get_path(input, path), &self.default) {
            (Some(Value::Null) | None, Some(default)) => Ok(default.clone()),
            (Some(value), _) => Ok(value.clone()),
            (None, None) => Err(MappingError::MissingSource {
                rule_id: self.rule_id.clone(),
                path: path.to_string(),
            }),
        }
    }
}

/// Apply mappings in priority order (higher first, ties in declaration order)
pub fn apply_mappings(
    mappings: &[FieldMapping],
    input: &Value,
    output: &mut Value,
) -> Result<Vec<AppliedMapping>, MappingError> {
    let mut ordered: Vec<&FieldMapping> = mappings.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut applied = Vec::new();
    for mapping in ordered {
        if let Some(done) = mapping.apply(input, output)? {
            applied.push(done);
        }
    }
    Ok(applied)
}

impl Condition {
    pub fn new(field_path: &str, condition_type: ConditionType, expected_value: Option<Value>) -> Self {
        Self {
            field_path: field_path.to_string(),
            condition_type,
            expected_value,
        }
    }

    pub fn is_satisfied(&self, input: &Value) -> bool {
        let field_value = get_path(input, &self.field_path);

        match self.condition_type {
            ConditionType::FieldExists => field_value.is_some(),
            ConditionType::FieldAbsent => field_value.is_none(),
            ConditionType::ValueEquals => match (field_value, &self.expected_value) {
                (Some(actual), Some(expected)) => values_match(actual, expected),
                _ => false,
            },
            ConditionType::ValueNotEquals => match (field_value, &self.expected_value) {
                (Some(actual), Some(expected)) => !values_match(actual, expected),
                _ => true,
            },
        }
    }
}

// Code-like strings compare case-insensitively so `EG` and `eg` match.
fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => actual == expected,
    }
}

impl TransformFn {
    pub fn apply(self, value: &Value) -> Result<Value, String> {
        match self {
            TransformFn::ToString => match value {
                // nullable fields stay null
                Value::Null => Ok(Value::Null),
                Value::String(s) => Ok(Value::String(s.clone())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(format!("cannot render {} as a string", type_name(other))),
            },
            TransformFn::ParseInteger => parse_integer(value).map(Value::from),
            TransformFn::Lowercase => expect_str(value).map(|s| Value::String(s.trim().to_lowercase())),
            TransformFn::Trim => expect_str(value).map(|s| Value::String(s.trim().to_string())),
            TransformFn::LanguageName => catalog_name(Catalog::Languages, value),
            TransformFn::CountryName => catalog_name(Catalog::Countries, value),
            TransformFn::WrapList => match value {
                Value::Array(_) => Ok(value.clone()),
                other => Ok(Value::Array(vec![other.clone()])),
            },
        }
    }
}

/// Integers may arrive as JSON numbers or as digit strings.
///
/// A float with no fractional part (`2.0`) counts, as it does for JSON Schema's
/// `integer` type.
pub fn parse_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| format!("{} is not an integer", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", s)),
        other => Err(format!("expected an integer, found {}", type_name(other))),
    }
}

fn expect_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected a string, found {}", type_name(value)))
}

fn catalog_name(catalog: Catalog, value: &Value) -> Result<Value, String> {
    let code = expect_str(value)?;
    catalog
        .name_of(code)
        .map(|name| Value::String(name.to_string()))
        .ok_or_else(|| format!("unknown code '{}'", code))
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
