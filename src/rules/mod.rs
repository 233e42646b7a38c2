//! Per-type transformation rules.
//!
//! A rule first applies its declarative field mappings (the shared envelope
//! plus anything type-specific the TypeSpec declares), then builds the
//! structural body of its question type and stamps the target `type`.

pub mod choice;
pub mod numeric;
pub mod puzzle;
pub mod text;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::field_mapping::{apply_mappings, parse_integer, type_name, FieldMapping, MappingError};
use crate::record::get_path;

/// A deterministic mapping from a legacy-shaped record to a target-shaped record.
pub trait Rule: Send + Sync {
    fn kind(&self) -> RuleKind;

    fn apply(&self, input: &Value) -> Result<Value, RuleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Mcq,
    Mrq,
    Opinion,
    Ordering,
    Matching,
    Counting,
    Frq,
    String,
    Gap,
    Puzzle,
    Input,
}

type BodyFn = fn(&Value, &mut Map<String, Value>) -> Result<(), RuleError>;

impl RuleKind {
    /// The `type` written on converted records.
    pub fn target_type(self) -> &'static str {
        match self {
            RuleKind::Mcq => "mcq",
            RuleKind::Mrq => "mrq",
            RuleKind::Opinion => "opinion",
            RuleKind::Ordering => "ordering",
            RuleKind::Matching => "matching",
            RuleKind::Counting => "counting",
            RuleKind::Frq => "frq",
            RuleKind::String => "string",
            RuleKind::Gap => "gap",
            RuleKind::Puzzle => "puzzle",
            RuleKind::Input => "input",
        }
    }

    fn body(self) -> BodyFn {
        match self {
            RuleKind::Mcq => choice::mcq,
            RuleKind::Mrq => choice::mrq,
            RuleKind::Opinion => choice::opinion,
            RuleKind::Ordering => choice::ordering,
            RuleKind::Matching => choice::matching,
            RuleKind::Counting => numeric::counting,
            RuleKind::Frq => text::frq,
            RuleKind::String => text::string,
            RuleKind::Gap => text::gap,
            RuleKind::Puzzle => puzzle::puzzle,
            RuleKind::Input => numeric::input,
        }
    }

    /// Bind this kind to its field mappings.
    pub fn build(self, mappings: Vec<FieldMapping>) -> Arc<dyn Rule> {
        Arc::new(MappedRule {
            kind: self,
            mappings,
        })
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target_type())
    }
}

/// Rule evaluation failure, with the offending path or expression when known.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct RuleError {
    pub path: Option<String>,
    pub expression: Option<String>,
    pub reason: String,
    /// Output built before the failure; diagnostics only.
    pub partial: Option<Value>,
}

impl RuleError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            path: None,
            expression: None,
            reason: reason.into(),
            partial: None,
        }
    }

    pub fn at(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new(reason)
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    fn or_partial(mut self, partial: &Value) -> Self {
        if self.partial.is_none() {
            self.partial = Some(partial.clone());
        }
        self
    }
}

impl From<MappingError> for RuleError {
    fn from(err: MappingError) -> Self {
        Self {
            path: err.path().map(str::to_string),
            expression: Some(format!("mapping '{}'", err.rule_id())),
            reason: err.to_string(),
            partial: None,
        }
    }
}

/// Field mappings followed by the kind's body builder.
pub struct MappedRule {
    kind: RuleKind,
    mappings: Vec<FieldMapping>,
}

impl Rule for MappedRule {
    fn kind(&self) -> RuleKind {
        self.kind
    }

    fn apply(&self, input: &Value) -> Result<Value, RuleError> {
        let mut output = Value::Object(Map::new());

        let applied = match apply_mappings(&self.mappings, input, &mut output) {
            Ok(applied) => applied,
            Err(err) => return Err(RuleError::from(err).or_partial(&output)),
        };
        for mapping in &applied {
            log::trace!(
                "{} mapping '{}' set {} = {}",
                self.kind,
                mapping.rule_id,
                mapping.target_path,
                mapping.new_value
            );
        }

        let body = self.kind.body();
        let Value::Object(fields) = &mut output else {
            return Err(RuleError::new("mappings replaced the output root with a non-object"));
        };
        if let Err(err) = body(input, fields) {
            return Err(err
                .with_expression(format!("{} body", self.kind))
                .or_partial(&Value::Object(fields.clone())));
        }
        fields.insert("type".to_string(), Value::String(self.kind.target_type().to_string()));

        Ok(output)
    }
}

// Accessors shared by the body builders. All failures carry the path.

pub(crate) fn field<'a>(input: &'a Value, path: &str) -> Result<&'a Value, RuleError> {
    get_path(input, path).ok_or_else(|| RuleError::at(path, format!("missing field '{}'", path)))
}

pub(crate) fn str_field<'a>(input: &'a Value, path: &str) -> Result<&'a str, RuleError> {
    let value = field(input, path)?;
    value
        .as_str()
        .ok_or_else(|| RuleError::at(path, format!("expected a string, found {}", type_name(value))))
}

pub(crate) fn array_field<'a>(input: &'a Value, path: &str) -> Result<&'a Vec<Value>, RuleError> {
    let value = field(input, path)?;
    value
        .as_array()
        .ok_or_else(|| RuleError::at(path, format!("expected an array, found {}", type_name(value))))
}

pub(crate) fn int_field(input: &Value, path: &str) -> Result<i64, RuleError> {
    parse_integer(field(input, path)?).map_err(|reason| RuleError::at(path, reason))
}

/// `A`, `B`, ... `Z`, `AA`, `AB`, ... for zero-based positions.
pub(crate) fn letter(position: usize) -> String {
    let mut n = position + 1;
    let mut label = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_mapping::MappingType;
    use serde_json::json;

    #[test]
    fn test_letters() {
        assert_eq!(letter(0), "A");
        assert_eq!(letter(25), "Z");
        assert_eq!(letter(26), "AA");
        assert_eq!(letter(27), "AB");
    }

    #[test]
    fn test_kind_from_yaml() {
        let kind: RuleKind = serde_yaml::from_str("ordering").unwrap();
        assert_eq!(kind, RuleKind::Ordering);
        assert_eq!(kind.target_type(), "ordering");
        let kind: RuleKind = serde_yaml::from_str("string").unwrap();
        assert_eq!(kind, RuleKind::String);
    }

    #[test]
    fn test_mapping_failure_keeps_partial_output() {
        let rule = RuleKind::Counting.build(vec![
            FieldMapping::new("stem", "stem", "stem", MappingType::Copy).with_priority(200),
            FieldMapping::new("subject", "subject", "subject", MappingType::Copy),
        ]);
        let err = rule.apply(&json!({ "stem": "How many?" })).unwrap_err();

        assert_eq!(err.path.as_deref(), Some("subject"));
        assert_eq!(err.expression.as_deref(), Some("mapping 'subject'"));
        assert_eq!(err.partial, Some(json!({ "stem": "How many?" })));
    }

    #[test]
    fn test_body_failure_names_kind() {
        let rule = RuleKind::Counting.build(Vec::new());
        let err = rule.apply(&json!({ "answer": "7" })).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("grid_size"));
        assert_eq!(err.expression.as_deref(), Some("counting body"));
    }

    #[test]
    fn test_type_is_stamped() {
        let rule = RuleKind::Counting.build(Vec::new());
        let out = rule.apply(&json!({ "answer": "7", "grid_size": "2x3" })).unwrap();
        assert_eq!(out["type"], "counting");
        assert_eq!(out["correct_answer"], 7);
    }
}
