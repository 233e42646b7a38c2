use serde_json::{json, Map, Value};

use super::{array_field, letter, RuleError};
use crate::field_mapping::parse_integer;
use crate::record::{join_index, join_key};

/// A legacy choice, read once and ordered by `fixed_order`.
struct Choice<'a> {
    path: String,
    is_key: bool,
    content: &'a Value,
    unit: Value,
    index: Option<i64>,
    pinned: bool,
    group: Option<&'a Value>,
}

fn read_choices(input: &Value) -> Result<Vec<Choice<'_>>, RuleError> {
    let raw = array_field(input, "choices")?;
    let mut choices = Vec::with_capacity(raw.len());

    for (i, item) in raw.iter().enumerate() {
        let path = join_index("choices", i);
        if !item.is_object() {
            return Err(RuleError::at(path, "choice is not an object"));
        }
        let kind = item
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::at(join_key(&path, "type"), "choice has no type"))?;
        let content = item
            .get("html_content")
            .ok_or_else(|| RuleError::at(join_key(&path, "html_content"), "choice has no html_content"))?;
        let fixed_order = item
            .get("fixed_order")
            .map(parse_integer)
            .transpose()
            .map_err(|reason| RuleError::at(join_key(&path, "fixed_order"), reason))?
            .unwrap_or(i as i64 + 1);
        let index = item
            .get("index")
            .map(parse_integer)
            .transpose()
            .map_err(|reason| RuleError::at(join_key(&path, "index"), reason))?;

        choices.push((
            fixed_order,
            Choice {
                is_key: kind == "key",
                content,
                unit: item.get("unit").cloned().unwrap_or(Value::Null),
                index,
                pinned: item.get("last_order").and_then(Value::as_bool).unwrap_or(false),
                group: item.get("group").filter(|g| !g.is_null()),
                path,
            },
        ));
    }

    choices.sort_by_key(|(order, _)| *order);
    Ok(choices.into_iter().map(|(_, choice)| choice).collect())
}

fn labelled(choices: &[Choice<'_>]) -> Vec<Value> {
    choices
        .iter()
        .enumerate()
        .map(|(n, c)| {
            json!({
                "label": letter(n),
                "value": c.content,
                "is_correct": c.is_key,
                "fixed_order": c.pinned,
                "unit": c.unit,
            })
        })
        .collect()
}

fn answer_refs(choices: &[Choice<'_>]) -> Vec<Value> {
    choices
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_key)
        .map(|(n, c)| json!({ "label": letter(n), "value": c.content }))
        .collect()
}

pub(super) fn mcq(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let choices = read_choices(input)?;
    let mut keys = answer_refs(&choices);
    if keys.len() != 1 {
        return Err(RuleError::at(
            "choices",
            format!("expected exactly one key choice, found {}", keys.len()),
        ));
    }

    out.insert("choices".to_string(), Value::Array(labelled(&choices)));
    out.insert("correct_answer".to_string(), keys.remove(0));
    Ok(())
}

pub(super) fn mrq(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let choices = read_choices(input)?;
    let keys = answer_refs(&choices);
    if keys.is_empty() {
        return Err(RuleError::at("choices", "no key choices"));
    }

    out.insert("choices".to_string(), Value::Array(labelled(&choices)));
    out.insert("correct_answer".to_string(), Value::Array(keys));
    Ok(())
}

pub(super) fn opinion(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let choices = read_choices(input)?;
    let rendered = choices
        .iter()
        .enumerate()
        .map(|(n, c)| json!({ "label": letter(n), "value": c.content, "fixed_order": c.pinned }))
        .collect();

    out.insert("choices".to_string(), Value::Array(rendered));
    out.remove("correct_answer");
    Ok(())
}

/// Items keep display order; the answer lists ids by each choice's `index`.
pub(super) fn ordering(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let choices = read_choices(input)?;

    let mut ranked = Vec::with_capacity(choices.len());
    for (n, choice) in choices.iter().enumerate() {
        let index = choice
            .index
            .ok_or_else(|| RuleError::at(join_key(&choice.path, "index"), "ordering choice has no index"))?;
        ranked.push((index, letter(n)));
    }
    ranked.sort_by_key(|(index, _)| *index);

    let items = choices
        .iter()
        .enumerate()
        .map(|(n, c)| json!({ "id": letter(n), "value": c.content, "display_order": n + 1 }))
        .collect();

    out.insert("items".to_string(), Value::Array(items));
    out.insert(
        "correct_answer".to_string(),
        Value::Array(ranked.into_iter().map(|(_, id)| Value::String(id)).collect()),
    );
    Ok(())
}

/// Two groups become columns `A` and `B`; partners share an `index`.
pub(super) fn matching(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let choices = read_choices(input)?;

    let mut groups: Vec<&Value> = Vec::new();
    for choice in &choices {
        let group = choice
            .group
            .ok_or_else(|| RuleError::at(join_key(&choice.path, "group"), "matching choice has no group"))?;
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    if groups.len() != 2 {
        return Err(RuleError::at(
            "choices",
            format!("expected 2 groups, found {}", groups.len()),
        ));
    }

    let left = column(&choices, "A", groups[0]);
    let right = column(&choices, "B", groups[1]);

    let mut pairs = Vec::with_capacity(left.len());
    for (id, choice) in &left {
        let partner = right
            .iter()
            .find(|(_, other)| other.index.is_some() && other.index == choice.index)
            .ok_or_else(|| {
                RuleError::at(
                    join_key(&choice.path, "index"),
                    format!("no partner in the second group for {}", id),
                )
            })?;
        pairs.push(json!({ "A": id, "B": partner.0 }));
    }

    out.insert(
        "items".to_string(),
        json!({
            "A": render(&left),
            "B": render(&right),
            "correct_answer": pairs,
        }),
    );
    Ok(())
}

fn column<'c, 'a>(choices: &'c [Choice<'a>], side: &str, group: &Value) -> Vec<(String, &'c Choice<'a>)> {
    choices
        .iter()
        .filter(|c| c.group == Some(group))
        .enumerate()
        .map(|(n, c)| (format!("{}{}", side, n + 1), c))
        .collect()
}

fn render(side: &[(String, &Choice<'_>)]) -> Vec<Value> {
    side.iter()
        .map(|(id, c)| json!({ "id": id, "value": c.content }))
        .collect()
}
