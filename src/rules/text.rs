use serde_json::{json, Map, Value};

use super::{array_field, field, RuleError};
use crate::field_mapping::{parse_integer, type_name};
use crate::record::{join_index, join_key};

fn acceptable_answers(input: &Value) -> Result<Vec<Value>, RuleError> {
    match field(input, "answer")? {
        Value::String(answer) => Ok(vec![Value::String(answer.trim().to_string())]),
        Value::Array(answers) => answers
            .iter()
            .enumerate()
            .map(|(i, answer)| match answer {
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                other => Err(RuleError::at(
                    join_index("answer", i),
                    format!("expected a string answer, found {}", type_name(other)),
                )),
            })
            .collect(),
        other => Err(RuleError::at(
            "answer",
            format!("expected a string or a list of strings, found {}", type_name(other)),
        )),
    }
}

pub(super) fn frq(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    out.insert("acceptable_answers".to_string(), Value::Array(acceptable_answers(input)?));
    Ok(())
}

pub(super) fn string(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    frq(input, out)
}

struct GapKey<'a> {
    value: &'a Value,
    fixed_order: i64,
    correct_order: Option<i64>,
}

/// Keys are shown in `fixed_order`; the answer lists values by `correct_order`,
/// skipping keys without one (they are distractors).
pub(super) fn gap(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let raw = array_field(input, "gap_text_keys")?;
    let mut keys = Vec::with_capacity(raw.len());

    for (i, item) in raw.iter().enumerate() {
        let path = join_index("gap_text_keys", i);
        let value = item
            .get("value")
            .ok_or_else(|| RuleError::at(join_key(&path, "value"), "gap key has no value"))?;
        let order = |name: &str| -> Result<Option<i64>, RuleError> {
            match item.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => parse_integer(v)
                    .map(Some)
                    .map_err(|reason| RuleError::at(join_key(&path, name), reason)),
            }
        };
        keys.push(GapKey {
            value,
            fixed_order: order("fixed_order")?.unwrap_or(i as i64 + 1),
            correct_order: order("correct_order")?,
        });
    }

    keys.sort_by_key(|k| k.fixed_order);
    let gap_keys = keys
        .iter()
        .enumerate()
        .map(|(n, k)| json!({ "value": k.value, "display_order": n + 1 }))
        .collect();

    let mut answered: Vec<(i64, &Value)> = keys
        .iter()
        .filter_map(|k| k.correct_order.map(|o| (o, k.value)))
        .collect();
    answered.sort_by_key(|(o, _)| *o);

    out.insert("gap_keys".to_string(), Value::Array(gap_keys));
    out.insert(
        "correct_answer".to_string(),
        Value::Array(answered.into_iter().map(|(_, v)| v.clone()).collect()),
    );
    Ok(())
}
