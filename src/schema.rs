use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::consistency::CheckSpec;
use crate::record::{join_key, pointer_to_path};
use crate::validation::{ValidationResult, Violation, ViolationKind};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to compile schema: {0}")]
    Compile(String),
}

/// JSON Schema document plus the cross-field checks layered on top of it.
pub struct StructuralSchema {
    document: Value,
    compiled: JSONSchema,
    checks: Vec<CheckSpec>,
}

impl fmt::Debug for StructuralSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralSchema")
            .field("document", &self.document)
            .field("checks", &self.checks)
            .finish()
    }
}

impl StructuralSchema {
    pub fn compile(document: Value, checks: Vec<CheckSpec>) -> Result<Self, SchemaError> {
        let compiled = JSONSchema::compile(&document).map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self {
            document,
            compiled,
            checks,
        })
    }

    /// Schema that accepts any object; used by tests and synthetic type specs.
    pub fn any_object() -> Result<Self, SchemaError> {
        Self::compile(serde_json::json!({ "type": "object" }), Vec::new())
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn checks(&self) -> &[CheckSpec] {
        &self.checks
    }

    /// Run the schema and every check; all findings are collected, none short-circuit.
    pub fn check(&self, record: &Value) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(errors) = self.compiled.validate(record) {
            for error in errors {
                let at = pointer_to_path(&error.instance_path.to_string());
                let expected = error.schema_path.to_string();
                let message = error.to_string();
                let observed = error.instance.clone().into_owned();

                match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let name = property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string());
                        result.add_violation(
                            Violation::new(join_key(&at, &name), ViolationKind::MissingField, message)
                                .with_expected(expected),
                        );
                    }
                    ValidationErrorKind::AdditionalProperties { unexpected } => {
                        for name in unexpected {
                            result.add_violation(
                                Violation::new(
                                    join_key(&at, name),
                                    ViolationKind::StructureViolation,
                                    format!("Additional property '{}' is not allowed", name),
                                )
                                .with_expected(expected.clone()),
                            );
                        }
                    }
                    kind => {
                        let kind = match kind {
                            ValidationErrorKind::Type { .. } => ViolationKind::InvalidType,
                            ValidationErrorKind::FalseSchema | ValidationErrorKind::Not { .. } => {
                                ViolationKind::StructureViolation
                            }
                            _ => ViolationKind::InvalidValue,
                        };
                        result.add_violation(
                            Violation::new(at, kind, message)
                                .with_expected(expected)
                                .with_observed(observed),
                        );
                    }
                }
            }
        }

        for check in &self.checks {
            check.evaluate(record, &mut result);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mcq_like() -> StructuralSchema {
        let checks: Vec<CheckSpec> = serde_yaml::from_str(
            r#"
            - id: single_key
              assert:
                kind: count
                array: options
                filter: { field: type, equals: key }
                min: 1
                max: 1
            "#,
        )
        .unwrap();

        StructuralSchema::compile(
            json!({
                "type": "object",
                "required": ["type", "stem", "options"],
                "properties": {
                    "type": { "const": "mcq" },
                    "stem": { "type": "string" },
                    "options": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["type"],
                            "properties": { "type": { "enum": ["key", "distractor"] } }
                        }
                    }
                }
            }),
            checks,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_required_field() {
        let result = mcq_like().check(&json!({ "type": "mcq", "stem": "Q?" }));
        assert!(!result.is_valid());
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].field_path, "options");
        assert_eq!(result.violations[0].issue(), "missing");
    }

    #[test]
    fn test_collects_all_violations() {
        let result = mcq_like().check(&json!({
            "type": "mcq",
            "stem": 7,
            "options": [{ "type": "wrong" }, {}]
        }));

        let paths: Vec<&str> = result.violations.iter().map(|v| v.field_path.as_str()).collect();
        assert!(paths.contains(&"stem"));
        assert!(paths.contains(&"options[0].type"));
        assert!(paths.contains(&"options[1].type"));
        // No key among options, so the consistency check fires as well.
        assert!(paths.contains(&"options"));

        let stem = result.violations.iter().find(|v| v.field_path == "stem").unwrap();
        assert_eq!(stem.kind, ViolationKind::InvalidType);
        assert_eq!(stem.observed, Some(json!(7)));
    }

    #[test]
    fn test_valid_record() {
        let result = mcq_like().check(&json!({
            "type": "mcq",
            "stem": "Q?",
            "options": [{ "type": "key" }, { "type": "distractor" }]
        }));
        assert!(result.is_valid());
    }

    #[test]
    fn test_additional_properties_are_structure_violations() {
        let schema = StructuralSchema::compile(
            json!({ "type": "object", "additionalProperties": false, "properties": { "a": {} } }),
            Vec::new(),
        )
        .unwrap();
        let result = schema.check(&json!({ "a": 1, "b": 2 }));
        assert_eq!(result.violations[0].field_path, "b");
        assert_eq!(result.violations[0].kind, ViolationKind::StructureViolation);
    }

    #[test]
    fn test_invalid_schema_document() {
        let err = StructuralSchema::compile(json!({ "type": 12 }), Vec::new()).unwrap_err();
        assert!(matches!(err, SchemaError::Compile(_)));
    }

    #[test]
    fn test_any_object() {
        let schema = StructuralSchema::any_object().unwrap();
        assert!(schema.check(&json!({ "x": 1 })).is_valid());
        assert!(!schema.check(&json!("x")).is_valid());
    }
}
