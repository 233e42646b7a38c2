use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

use crate::field_mapping::type_name;
use crate::rules::RuleError;
use crate::type_registry::TypeSpec;

/// Result of running a record through its type's rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Converted(Value),
    Failed(ConversionError),
}

impl ConversionOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted(_))
    }
}

/// Why a rule could not produce output.
///
/// `partial_output` is whatever the rule had built before it failed. It is
/// kept for diagnostics only and never written as a converted record.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{reason}")]
pub struct ConversionError {
    pub reason: String,
    pub path: Option<String>,
    pub expression: Option<String>,
    pub partial_output: Option<Value>,
}

impl ConversionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            path: None,
            expression: None,
            partial_output: None,
        }
    }
}

impl From<RuleError> for ConversionError {
    fn from(err: RuleError) -> Self {
        Self {
            reason: err.reason,
            path: err.path,
            expression: err.expression,
            partial_output: err.partial,
        }
    }
}

/// Apply `spec`'s rule to a normalized view of `record`.
///
/// Never panics: rule failures, rule panics and non-object output all become
/// `ConversionOutcome::Failed`.
pub fn convert(record: &Value, spec: &TypeSpec) -> ConversionOutcome {
    let view = normalize(record);
    let rule = spec.rule();
    log::debug!("Applying {} rule for '{}'", rule.kind(), spec.discriminator());

    match panic::catch_unwind(AssertUnwindSafe(|| rule.apply(&view))) {
        Ok(Ok(output)) if output.is_object() => ConversionOutcome::Converted(output),
        Ok(Ok(output)) => ConversionOutcome::Failed(ConversionError {
            partial_output: Some(output.clone()),
            ..ConversionError::new(format!("rule produced {} instead of an object", type_name(&output)))
        }),
        Ok(Err(err)) => ConversionOutcome::Failed(err.into()),
        Err(payload) => ConversionOutcome::Failed(ConversionError {
            expression: Some(format!("{} rule", rule.kind())),
            ..ConversionError::new(format!("rule panicked: {}", panic_message(payload.as_ref())))
        }),
    }
}

/// Copy of `record` with surrounding whitespace trimmed from every string.
pub fn normalize(record: &Value) -> Value {
    match record {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
