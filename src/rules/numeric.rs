use serde_json::{json, Map, Value};

use super::{field, int_field, str_field, RuleError};
use crate::field_mapping::type_name;

/// Parse `R×C` (also `RxC` and `R*C`) into positive rows and columns.
pub fn parse_grid_size(raw: &str) -> Option<(i64, i64)> {
    let mut parts = raw.split(|c: char| matches!(c, '×' | 'x' | 'X' | '*'));
    let rows = parts.next()?.trim().parse::<i64>().ok()?;
    let columns = parts.next()?.trim().parse::<i64>().ok()?;
    if parts.next().is_some() || rows <= 0 || columns <= 0 {
        return None;
    }
    Some((rows, columns))
}

pub(super) fn counting(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let raw = str_field(input, "grid_size")?;
    let (rows, columns) = parse_grid_size(raw)
        .ok_or_else(|| RuleError::at("grid_size", format!("'{}' is not a ROWS×COLUMNS grid size", raw)))?;
    let answer = int_field(input, "answer")?;

    out.insert("grid".to_string(), json!({ "rows": rows, "columns": columns }));
    out.insert("correct_answer".to_string(), Value::from(answer));
    Ok(())
}

pub(super) fn input(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let value = match field(input, "answer.value")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(RuleError::at(
                "answer.value",
                format!("expected a string or number, found {}", type_name(other)),
            ))
        }
    };
    let constraint = str_field(input, "answer.constrains.type")?;
    let unit = input
        .get("answer")
        .and_then(|a| a.get("unit"))
        .cloned()
        .unwrap_or(Value::Null);

    out.insert(
        "correct_answer".to_string(),
        json!({
            "value": value,
            "constraints": { "type": constraint },
            "unit": unit,
        }),
    );
    Ok(())
}
