use serde_json::{json, Map, Value};

use super::{array_field, int_field, str_field, RuleError};
use crate::record::join_index;

pub(super) fn puzzle(input: &Value, out: &mut Map<String, Value>) -> Result<(), RuleError> {
    let rows = int_field(input, "puzzleRows")?;
    let columns = int_field(input, "puzzleColumns")?;
    let width = int_field(input, "puzzleImageWidth")?;
    let height = int_field(input, "puzzleImageHeight")?;
    let src = str_field(input, "puzzleImage")?;

    let pieces = array_field(input, "puzzleImageSplited")?
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let piece_src = match piece {
                Value::String(s) => Some(s.as_str()),
                Value::Object(map) => map.get("src").and_then(Value::as_str),
                _ => None,
            };
            piece_src
                .map(|s| json!({ "position": i + 1, "src": s }))
                .ok_or_else(|| RuleError::at(join_index("puzzleImageSplited", i), "piece has no image source"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    out.insert("rows".to_string(), Value::from(rows));
    out.insert("columns".to_string(), Value::from(columns));
    out.insert(
        "image".to_string(),
        json!({ "src": src, "width": width, "height": height }),
    );
    out.insert("pieces".to_string(), Value::Array(pieces));
    Ok(())
}
