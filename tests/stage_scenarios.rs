//! Stage isolation and diagnostics with hand-built type specs.

use question_migrate::outcome::{classify, Disposition};
use question_migrate::pipeline::{Diagnostic, Pipeline, PipelineOptions, TerminalState};
use question_migrate::record::Record;
use question_migrate::rules::{Rule, RuleError, RuleKind};
use question_migrate::schema::StructuralSchema;
use question_migrate::type_registry::{TypeRegistry, TypeSpec};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Copies the input and records how often it ran.
struct CountingRule {
    calls: Arc<AtomicUsize>,
    output: fn(&Value) -> Result<Value, RuleError>,
}

impl Rule for CountingRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Mcq
    }

    fn apply(&self, input: &Value) -> Result<Value, RuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.output)(input)
    }
}

fn forgets_answer(input: &Value) -> Result<Value, RuleError> {
    Ok(json!({ "type": "mcq", "stem": input["stem"] }))
}

fn names_answer(input: &Value) -> Result<Value, RuleError> {
    Ok(json!({ "type": "mcq", "stem": input["stem"], "correctOptionId": input["options"][0]["id"] }))
}

fn breaks(_input: &Value) -> Result<Value, RuleError> {
    Err(RuleError::at("options[0].id", "option id is not a string"))
}

fn registry(output: fn(&Value) -> Result<Value, RuleError>) -> (TypeRegistry, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let legacy = StructuralSchema::compile(
        json!({
            "type": "object",
            "required": ["type", "stem", "options"],
            "properties": {
                "options": { "type": "array", "items": { "type": "object", "required": ["id"] } }
            }
        }),
        Vec::new(),
    )
    .unwrap();
    let target = StructuralSchema::compile(
        json!({
            "type": "object",
            "required": ["type", "stem", "correctOptionId"],
            "properties": { "correctOptionId": { "type": "string" } }
        }),
        Vec::new(),
    )
    .unwrap();
    let rule = CountingRule {
        calls: Arc::clone(&calls),
        output,
    };

    let mut registry = TypeRegistry::new();
    registry
        .register(TypeSpec::new("mcq", legacy, target, Arc::new(rule)))
        .unwrap();
    (registry, calls)
}

fn valid_mcq() -> Value {
    json!({ "type": "mcq", "stem": "Pick one", "options": [{ "id": "o1" }, { "id": "o2" }] })
}

#[test]
fn test_missing_options_never_reaches_converter() {
    let (registry, calls) = registry(names_answer);
    let pipeline = Pipeline::new(&registry, PipelineOptions::default());
    let result = pipeline.run(&Record::new("m.json", json!({ "type": "mcq", "stem": "Pick one" })));

    assert_eq!(result.terminal, TerminalState::PreFailed);
    assert_eq!(classify(&result), Disposition::PreValidationFailed);
    let violations = result.diagnostic.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].field_path, "options");
    assert_eq!(violations[0].issue(), "missing");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_rule_defect_is_post_failure() {
    let (registry, calls) = registry(forgets_answer);
    let pipeline = Pipeline::new(&registry, PipelineOptions::default());
    let result = pipeline.run(&Record::new("m.json", valid_mcq()));

    assert_eq!(result.terminal, TerminalState::PostFailed);
    assert_eq!(classify(&result), Disposition::PostValidationFailed);
    match &result.diagnostic {
        Diagnostic::PostValidation { violations } => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].field_path, "correctOptionId");
            assert_eq!(violations[0].issue(), "missing");
        }
        other => panic!("expected post-validation diagnostic, got {:?}", other),
    }
    assert!(result.output.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_conversion_failure_skips_post_validation() {
    let (registry, _) = registry(breaks);
    let pipeline = Pipeline::new(&registry, PipelineOptions::default());
    let result = pipeline.run(&Record::new("m.json", valid_mcq()));

    assert_eq!(result.terminal, TerminalState::ConvertFailed);
    assert!(result.output.is_none());
    match &result.diagnostic {
        Diagnostic::Conversion { error } => assert_eq!(error.path.as_deref(), Some("options[0].id")),
        other => panic!("expected conversion diagnostic, got {:?}", other),
    }
}

#[test]
fn test_correct_rule_succeeds() {
    let (registry, _) = registry(names_answer);
    let pipeline = Pipeline::new(&registry, PipelineOptions::default());
    let result = pipeline.run(&Record::new("m.json", valid_mcq()));

    assert_eq!(result.terminal, TerminalState::Succeeded);
    assert_eq!(result.output.unwrap()["correctOptionId"], "o1");
}

#[test]
fn test_essay_is_unsupported() {
    let (registry, calls) = registry(names_answer);
    let pipeline = Pipeline::new(&registry, PipelineOptions::default());
    let result = pipeline.run(&Record::new("e.json", json!({ "type": "essay", "stem": "Discuss." })));

    assert_eq!(result.terminal, TerminalState::PreFailed);
    assert_eq!(result.diagnostic.violations()[0].issue(), "unsupported type");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_same_record_converts_identically() {
    let registry = TypeRegistry::builtin().unwrap();
    let pipeline = Pipeline::new(&registry, PipelineOptions::default());
    let record = Record::new(
        "CNT1.json",
        json!({
            "question_id": "CNT1",
            "type": "counting",
            "stem": "<p>Count the dots.</p>",
            "language": "ar",
            "country": "eg",
            "subject": "Math",
            "grade": "1",
            "section_id": "5",
            "choices": [],
            "answer": " 9 ",
            "grid_size": "3x3"
        }),
    );

    let first = serde_json::to_string_pretty(&pipeline.run(&record).output.unwrap()).unwrap();
    let second = serde_json::to_string_pretty(&pipeline.run(&record).output.unwrap()).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("\"correct_answer\": 9"));
}
