use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::type_registry::TypeSpec;

/// Which side of the migration a record is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Legacy structure, before conversion.
    Pre,
    /// Target structure, after conversion.
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pre => write!(f, "pre-conversion"),
            Phase::Post => write!(f, "post-conversion"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// Outcome of validating one record against one schema.
///
/// Validation never stops at the first problem, so `violations` holds every
/// error-severity finding of a single pass. Warnings never affect validity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result for a record whose `type` does not resolve to a known TypeSpec.
    pub fn unsupported_type(record: &Value) -> Self {
        let mut result = Self::new();
        let violation = match record {
            Value::Object(map) => match map.get("type") {
                None => Violation::new(
                    "type",
                    ViolationKind::MissingField,
                    "Missing required field 'type'",
                )
                .with_expected("one of the supported question types"),
                Some(observed) => Violation::new(
                    "type",
                    ViolationKind::UnsupportedType,
                    format!("unsupported type {}", observed),
                )
                .with_expected("one of the supported question types")
                .with_observed(observed.clone()),
            },
            other => Violation::new(
                "",
                ViolationKind::StructureViolation,
                "Record must be a JSON object",
            )
            .with_expected("object")
            .with_observed(other.clone()),
        };
        result.add_violation(violation);
        result
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn add_warning(&mut self, warning: Violation) {
        self.warnings.push(warning);
    }

    /// Route a finding by severity.
    pub fn add(&mut self, severity: Severity, violation: Violation) {
        match severity {
            Severity::Error => self.add_violation(violation),
            Severity::Warning => self.add_warning(violation),
        }
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.violations.extend(other.violations);
        self.warnings.extend(other.warnings);
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// One structural non-conformance: where, what was expected, what was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted field path (`choices[0].type`); empty for the record root.
    pub field_path: String,
    pub kind: ViolationKind,
    pub message: String,
    pub expected: Option<String>,
    pub observed: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingField,
    InvalidType,
    InvalidValue,
    StructureViolation,
    Inconsistent,
    UnsupportedType,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::MissingField => "missing",
            ViolationKind::InvalidType => "invalid type",
            ViolationKind::InvalidValue => "invalid value",
            ViolationKind::StructureViolation => "structure violation",
            ViolationKind::Inconsistent => "inconsistent",
            ViolationKind::UnsupportedType => "unsupported type",
        };
        f.write_str(label)
    }
}

impl Violation {
    pub fn new(field_path: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            message: message.into(),
            expected: None,
            observed: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_observed(mut self, observed: Value) -> Self {
        self.observed = Some(observed);
        self
    }

    /// The short issue label (`missing`, `invalid type`, ...).
    pub fn issue(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field_path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field_path, self.message)
        }
    }
}

/// Check `record` against the legacy (`Pre`) or target (`Post`) structure of `spec`.
///
/// A missing spec means the record's discriminator did not resolve; that is an
/// ordinary invalid result with a single synthetic violation.
pub fn validate(record: &Value, spec: Option<&TypeSpec>, phase: Phase) -> ValidationResult {
    match spec {
        Some(spec) => spec.schema(phase).check(record),
        None => ValidationResult::unsupported_type(record),
    }
}
