use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::converter::{convert, ConversionError, ConversionOutcome};
use crate::record::Record;
use crate::type_registry::{TypeRegistry, TypeSpec};
use crate::validation::{validate, Phase, ValidationResult, Violation, ViolationKind};

/// Where a record's run through the pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Succeeded,
    PreFailed,
    ConvertFailed,
    PostFailed,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TerminalState::Succeeded => "SUCCEEDED",
            TerminalState::PreFailed => "PRE_FAILED",
            TerminalState::ConvertFailed => "CONVERT_FAILED",
            TerminalState::PostFailed => "POST_FAILED",
        };
        f.write_str(label)
    }
}

/// What explains a terminal state. Each variant comes from exactly one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Diagnostic {
    None,
    PreValidation { violations: Vec<Violation> },
    Conversion { error: ConversionError },
    PostValidation { violations: Vec<Violation> },
    /// A defect outside validation and conversion, caught at the batch boundary.
    Unexpected { message: String },
}

impl Diagnostic {
    pub fn violations(&self) -> &[Violation] {
        match self {
            Diagnostic::PreValidation { violations } | Diagnostic::PostValidation { violations } => violations,
            _ => &[],
        }
    }

    /// One line per finding, for logs and report cells.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Diagnostic::None => Vec::new(),
            Diagnostic::PreValidation { violations } | Diagnostic::PostValidation { violations } => {
                violations.iter().map(|v| format!("[{}] {}", v.issue(), v)).collect()
            }
            Diagnostic::Conversion { error } => {
                let mut line = error.reason.clone();
                if let Some(path) = &error.path {
                    line = format!("{} (at '{}')", line, path);
                }
                if let Some(expression) = &error.expression {
                    line = format!("{} in {}", line, expression);
                }
                vec![line]
            }
            Diagnostic::Unexpected { message } => vec![format!("unexpected defect: {}", message)],
        }
    }
}

/// One record's outcome: terminal state, its diagnostic and any output.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub filename: String,
    pub question_id: Option<String>,
    /// The raw `type` the record declared.
    pub type_name: Option<String>,
    pub terminal: TerminalState,
    pub diagnostic: Diagnostic,
    /// Converted record; present for `Succeeded` and `PostFailed` only.
    pub output: Option<Value>,
    pub warnings: Vec<Violation>,
}

impl PipelineResult {
    /// Result for a record that never made it through the pipeline.
    pub fn unexpected(filename: impl Into<String>, record: Option<&Record>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            question_id: record.and_then(Record::question_id),
            type_name: record.and_then(|r| r.type_discriminator().map(str::to_string)),
            terminal: TerminalState::ConvertFailed,
            diagnostic: Diagnostic::Unexpected {
                message: message.into(),
            },
            output: None,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Require `question_id` to equal the file stem.
    pub check_identity: bool,
}

enum State<'s> {
    Start,
    PreValidating,
    Converting(&'s TypeSpec),
    PostValidating(&'s TypeSpec, Value),
    Done(TerminalState, Diagnostic, Option<Value>),
}

/// Pre-validation, conversion and post-validation for one record at a time.
pub struct Pipeline<'r> {
    registry: &'r TypeRegistry,
    options: PipelineOptions,
}

impl<'r> Pipeline<'r> {
    pub fn new(registry: &'r TypeRegistry, options: PipelineOptions) -> Self {
        Self { registry, options }
    }

    pub fn run(&self, record: &Record) -> PipelineResult {
        let mut warnings = Vec::new();
        let mut state = State::Start;

        let (terminal, diagnostic, output) = loop {
            state = match state {
                State::Start => State::PreValidating,

                State::PreValidating => {
                    let spec = record.type_discriminator().and_then(|t| self.registry.resolve(t));
                    let mut result = validate(&record.value, spec, Phase::Pre);
                    if spec.is_some() && self.options.check_identity {
                        check_identity(record, &mut result);
                    }
                    warnings.extend(std::mem::take(&mut result.warnings));

                    match spec {
                        Some(spec) if result.is_valid() => State::Converting(spec),
                        _ => State::Done(
                            TerminalState::PreFailed,
                            Diagnostic::PreValidation {
                                violations: result.violations,
                            },
                            None,
                        ),
                    }
                }

                State::Converting(spec) => match convert(&record.value, spec) {
                    ConversionOutcome::Converted(output) => State::PostValidating(spec, output),
                    ConversionOutcome::Failed(error) => {
                        State::Done(TerminalState::ConvertFailed, Diagnostic::Conversion { error }, None)
                    }
                },

                State::PostValidating(spec, output) => {
                    let mut result = validate(&output, Some(spec), Phase::Post);
                    warnings.extend(std::mem::take(&mut result.warnings));
                    if result.is_valid() {
                        State::Done(TerminalState::Succeeded, Diagnostic::None, Some(output))
                    } else {
                        State::Done(
                            TerminalState::PostFailed,
                            Diagnostic::PostValidation {
                                violations: result.violations,
                            },
                            Some(output),
                        )
                    }
                }

                State::Done(terminal, diagnostic, output) => break (terminal, diagnostic, output),
            };
        };

        log::debug!("{}: {}", record.filename, terminal);
        PipelineResult {
            filename: record.filename.clone(),
            question_id: record.question_id(),
            type_name: record.type_discriminator().map(str::to_string),
            terminal,
            diagnostic,
            output,
            warnings,
        }
    }
}

fn check_identity(record: &Record, result: &mut ValidationResult) {
    let Some(question_id) = record.question_id() else {
        return;
    };
    let stem = record.file_stem();
    if question_id != stem {
        result.add_violation(
            Violation::new(
                "question_id",
                ViolationKind::Inconsistent,
                format!("question_id '{}' does not match filename '{}'", question_id, stem),
            )
            .with_expected(stem.to_string())
            .with_observed(Value::String(question_id)),
        );
    }
}
