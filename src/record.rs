use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// One question document together with the filename it was read from.
///
/// The filename is the record's identity: it names the report entry and the
/// output file, and it is checked against `question_id` during pre-validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub filename: String,
    pub value: Value,
}

impl Record {
    pub fn new(filename: impl Into<String>, value: Value) -> Self {
        Self {
            filename: filename.into(),
            value,
        }
    }

    /// The raw `type` discriminator, if the record is an object carrying a string `type`.
    pub fn type_discriminator(&self) -> Option<&str> {
        self.value.get("type").and_then(Value::as_str)
    }

    /// `question_id` as a string; numeric ids are accepted the way legacy exports wrote them.
    pub fn question_id(&self) -> Option<String> {
        match self.value.get("question_id")? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Filename without directory and `.json` extension.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.filename)
    }
}

/// One segment of a dotted field path such as `choices[2].html_content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid field path '{0}'")]
    InvalidPath(String),

    #[error("Cannot write '{path}': parent of '{segment}' is not an object")]
    NotAnObject { path: String, segment: String },

    #[error("Cannot write '{path}': index {index} is out of bounds")]
    IndexOutOfBounds { path: String, index: usize },
}

/// Parse a dotted path. The empty path addresses the record root.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }

    for part in path.split('.') {
        if part.is_empty() {
            return Err(PathError::InvalidPath(path.to_string()));
        }

        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            segments.push(PathSegment::Key(name.to_string()));
        }

        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| PathError::InvalidPath(path.to_string()))?;
            if !rest.starts_with('[') {
                return Err(PathError::InvalidPath(path.to_string()));
            }
            let index = rest[1..close]
                .parse::<usize>()
                .map_err(|_| PathError::InvalidPath(path.to_string()))?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
        }
    }

    Ok(segments)
}

/// Resolve a dotted path against a JSON value.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path).ok()?;
    let mut current = value;

    for segment in &segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Write `new_value` at `path`, creating intermediate objects as needed.
///
/// Array segments must address an existing element or the slot directly
/// after the last one.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) -> Result<(), PathError> {
    let segments = parse_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        *value = new_value;
        return Ok(());
    };

    let mut current = value;
    for segment in parents {
        current = match segment {
            PathSegment::Key(key) => {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                let map = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
                    path: path.to_string(),
                    segment: key.clone(),
                })?;
                map.entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
            }
            PathSegment::Index(index) => current
                .as_array_mut()
                .and_then(|items| items.get_mut(*index))
                .ok_or_else(|| PathError::IndexOutOfBounds {
                    path: path.to_string(),
                    index: *index,
                })?,
        };
    }

    match last {
        PathSegment::Key(key) => {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            let map = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
                path: path.to_string(),
                segment: key.clone(),
            })?;
            map.insert(key.clone(), new_value);
        }
        PathSegment::Index(index) => {
            let items = current
                .as_array_mut()
                .ok_or_else(|| PathError::IndexOutOfBounds {
                    path: path.to_string(),
                    index: *index,
                })?;
            if *index < items.len() {
                items[*index] = new_value;
            } else if *index == items.len() {
                items.push(new_value);
            } else {
                return Err(PathError::IndexOutOfBounds {
                    path: path.to_string(),
                    index: *index,
                });
            }
        }
    }

    Ok(())
}

/// Convert a JSON pointer (`/choices/0/type`) into a dotted path (`choices[0].type`).
pub fn pointer_to_path(pointer: &str) -> String {
    let mut path = String::new();
    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        if token.parse::<usize>().is_ok() {
            path.push('[');
            path.push_str(&token);
            path.push(']');
        } else {
            path = join_key(&path, &token);
        }
    }
    path
}

pub fn join_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

pub fn join_index(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

/// Short, single-line rendering of a value for diagnostics.
pub fn describe_value(value: &Value) -> String {
    const LIMIT: usize = 120;
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() > LIMIT {
        let truncated: String = rendered.chars().take(LIMIT).collect();
        format!("{}…", truncated)
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("").unwrap(), Vec::<PathSegment>::new());
        assert_eq!(
            parse_path("choices[2].html_content").unwrap(),
            vec![
                PathSegment::Key("choices".to_string()),
                PathSegment::Index(2),
                PathSegment::Key("html_content".to_string()),
            ]
        );
        assert_eq!(
            parse_path("grid[0][1]").unwrap(),
            vec![
                PathSegment::Key("grid".to_string()),
                PathSegment::Index(0),
                PathSegment::Index(1),
            ]
        );
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[x]").is_err());
        assert!(parse_path("a[1").is_err());
    }

    #[test]
    fn test_get_path() {
        let record = json!({
            "answer": { "constrains": { "type": "integer" } },
            "choices": [{ "type": "key" }, { "type": "distractor" }]
        });

        assert_eq!(
            get_path(&record, "answer.constrains.type"),
            Some(&json!("integer"))
        );
        assert_eq!(get_path(&record, "choices[1].type"), Some(&json!("distractor")));
        assert!(get_path(&record, "choices[5].type").is_none());
        assert!(get_path(&record, "answer.missing.type").is_none());
        assert_eq!(get_path(&record, ""), Some(&record));
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut out = json!({});
        set_path(&mut out, "grid.rows", json!(3)).unwrap();
        set_path(&mut out, "grid.columns", json!(4)).unwrap();
        assert_eq!(out, json!({ "grid": { "rows": 3, "columns": 4 } }));
    }

    #[test]
    fn test_set_path_arrays() {
        let mut out = json!({ "items": [1] });
        set_path(&mut out, "items[1]", json!(2)).unwrap();
        set_path(&mut out, "items[0]", json!(0)).unwrap();
        assert_eq!(out, json!({ "items": [0, 2] }));

        let err = set_path(&mut out, "items[5]", json!(9)).unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfBounds { index: 5, .. }));
    }

    #[test]
    fn test_set_path_rejects_scalar_parent() {
        let mut out = json!({ "stem": "text" });
        let err = set_path(&mut out, "stem.inner", json!(1)).unwrap_err();
        assert!(matches!(err, PathError::NotAnObject { .. }));
    }

    #[test]
    fn test_pointer_to_path() {
        assert_eq!(pointer_to_path(""), "");
        assert_eq!(pointer_to_path("/options"), "options");
        assert_eq!(pointer_to_path("/choices/0/type"), "choices[0].type");
        assert_eq!(pointer_to_path("/a~1b"), "a/b");
    }

    #[test]
    fn test_record_identity() {
        let record = Record::new("nested/Q-17.json", json!({ "question_id": 17, "type": "mcq" }));
        assert_eq!(record.file_stem(), "Q-17");
        assert_eq!(record.question_id(), Some("17".to_string()));
        assert_eq!(record.type_discriminator(), Some("mcq"));
    }

    #[test]
    fn test_describe_value_truncates() {
        let long = Value::String("x".repeat(300));
        assert!(describe_value(&long).chars().count() <= 121);
        assert_eq!(describe_value(&json!(null)), "null");
    }
}
