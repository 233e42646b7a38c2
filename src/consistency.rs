//! Cross-field assertions that JSON Schema cannot express.
//!
//! Every assertion quietly skips when the fields it relates are absent or of
//! the wrong shape; reporting those is the structural schema's job, and doing
//! it twice would double every diagnostic.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::catalog::Catalog;
use crate::field_mapping::{parse_integer, Condition};
use crate::record::{get_path, join_index, join_key};
use crate::validation::{Severity, ValidationResult, Violation, ViolationKind};

/// A named assertion with its severity and optional guard condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    pub id: String,
    pub assert: Assertion,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub when: Option<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assertion {
    /// Number of array elements matching `filter` lies within `min..=max`.
    Count {
        array: String,
        #[serde(default)]
        filter: Option<Predicate>,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    /// Number of distinct non-null values of `field` across the array.
    DistinctCount {
        array: String,
        field: String,
        equals: usize,
    },
    /// The value at `from` (or each of its elements) appears among the array's `field` values.
    References {
        from: String,
        array: String,
        #[serde(default)]
        field: Option<String>,
    },
    /// Occurrences of `marker` in the text field relate to the array's size.
    MarkerCount {
        text: String,
        marker: String,
        array: String,
        #[serde(default)]
        having: Option<String>,
        relation: Relation,
        #[serde(default)]
        min_markers: usize,
    },
    /// Splitting the array by `group`, each element of the first group has a
    /// partner in the second group with the same `key`. Groups are ordered by
    /// first appearance, after sorting on the integer field `order_by` if set.
    PairedBy {
        array: String,
        group: String,
        key: String,
        #[serde(default)]
        order_by: Option<String>,
    },
    /// Product of integer fields equals the array's length.
    Product { factors: Vec<String>, array: String },
    /// A name field carries the catalog name of a code field.
    CatalogName {
        code: String,
        name: String,
        catalog: Catalog,
    },
    /// A value parses as the numeric format (`integer` or `decimal`) named by another field.
    NumericFormat { value: String, format: String },
    /// An HTML field is exactly one top-level element of `tag`.
    WrappedInTag {
        field: String,
        tag: String,
        #[serde(skip)]
        pattern: OnceLock<Option<Regex>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    #[serde(default)]
    pub equals: Option<Value>,
    #[serde(default)]
    pub not_equals: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    AtLeast,
    Exactly,
}

impl Predicate {
    pub fn matches(&self, element: &Value) -> bool {
        let actual = get_path(element, &self.field);
        let equals_ok = self
            .equals
            .as_ref()
            .map_or(true, |expected| actual == Some(expected));
        let not_equals_ok = self
            .not_equals
            .as_ref()
            .map_or(true, |unexpected| actual != Some(unexpected));
        equals_ok && not_equals_ok
    }
}

impl CheckSpec {
    pub fn evaluate(&self, record: &Value, result: &mut ValidationResult) {
        if let Some(condition) = &self.when {
            if !condition.is_satisfied(record) {
                return;
            }
        }
        for violation in self.assert.evaluate(&self.id, record) {
            result.add(self.severity, violation);
        }
    }
}

impl Assertion {
    fn evaluate(&self, id: &str, record: &Value) -> Vec<Violation> {
        match self {
            Assertion::Count {
                array,
                filter,
                min,
                max,
            } => {
                let Some(items) = get_path(record, array).and_then(Value::as_array) else {
                    return Vec::new();
                };
                let found = items
                    .iter()
                    .filter(|item| filter.as_ref().map_or(true, |f| f.matches(item)))
                    .count();
                let too_few = min.map_or(false, |min| found < min);
                let too_many = max.map_or(false, |max| found > max);
                if !(too_few || too_many) {
                    return Vec::new();
                }
                vec![inconsistent(
                    array,
                    format!("{}: expected {} matching element(s), found {}", id, describe_range(*min, *max), found),
                    describe_range(*min, *max),
                    Value::from(found),
                )]
            }

            Assertion::DistinctCount {
                array,
                field,
                equals,
            } => {
                let Some(items) = get_path(record, array).and_then(Value::as_array) else {
                    return Vec::new();
                };
                let mut distinct: Vec<&Value> = Vec::new();
                for value in items.iter().filter_map(|item| get_path(item, field)) {
                    if !value.is_null() && !distinct.contains(&value) {
                        distinct.push(value);
                    }
                }
                if distinct.len() == *equals {
                    return Vec::new();
                }
                vec![inconsistent(
                    array,
                    format!(
                        "{}: expected {} distinct '{}' value(s), found {}",
                        id,
                        equals,
                        field,
                        distinct.len()
                    ),
                    format!("{} distinct values", equals),
                    Value::Array(distinct.into_iter().cloned().collect()),
                )]
            }

            Assertion::References { from, array, field } => {
                let (Some(source), Some(items)) = (
                    get_path(record, from),
                    get_path(record, array).and_then(Value::as_array),
                ) else {
                    return Vec::new();
                };
                let targets: Vec<&Value> = items
                    .iter()
                    .filter_map(|item| match field {
                        Some(field) => get_path(item, field),
                        None => Some(item),
                    })
                    .collect();

                let referenced: Vec<(String, &Value)> = match source {
                    Value::Array(values) => values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (join_index(from, i), v))
                        .collect(),
                    single => vec![(from.clone(), single)],
                };

                referenced
                    .into_iter()
                    .filter(|(_, value)| !targets.contains(value))
                    .map(|(path, value)| {
                        inconsistent(
                            &path,
                            format!("{}: {} does not reference an existing element of '{}'", id, value, array),
                            format!("a value present in {}", array),
                            value.clone(),
                        )
                    })
                    .collect()
            }

            Assertion::MarkerCount {
                text,
                marker,
                array,
                having,
                relation,
                min_markers,
            } => {
                let Some(body) = get_path(record, text).and_then(Value::as_str) else {
                    return Vec::new();
                };
                let markers = body.matches(marker.as_str()).count();
                if markers < *min_markers {
                    return vec![inconsistent(
                        text,
                        format!("{}: expected at least {} '{}' marker(s), found {}", id, min_markers, marker, markers),
                        format!("at least {} markers", min_markers),
                        Value::from(markers),
                    )];
                }
                let Some(items) = get_path(record, array).and_then(Value::as_array) else {
                    return Vec::new();
                };
                let counted = items
                    .iter()
                    .filter(|item| {
                        having
                            .as_ref()
                            .map_or(true, |f| get_path(item, f).is_some_and(|v| !v.is_null()))
                    })
                    .count();
                let ok = match relation {
                    Relation::AtLeast => counted >= markers,
                    Relation::Exactly => counted == markers,
                };
                if ok {
                    return Vec::new();
                }
                let expected = match relation {
                    Relation::AtLeast => format!("at least {}", markers),
                    Relation::Exactly => format!("exactly {}", markers),
                };
                vec![inconsistent(
                    array,
                    format!("{}: found {}, expected {}", id, counted, expected),
                    expected,
                    Value::from(counted),
                )]
            }

            Assertion::PairedBy {
                array,
                group,
                key,
                order_by,
            } => {
                let Some(items) = get_path(record, array).and_then(Value::as_array) else {
                    return Vec::new();
                };
                let mut ordered: Vec<(i64, &Value)> = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let rank = order_by
                            .as_ref()
                            .and_then(|field| get_path(item, field))
                            .and_then(|v| parse_integer(v).ok())
                            .unwrap_or(i as i64 + 1);
                        (rank, item)
                    })
                    .collect();
                ordered.sort_by_key(|(rank, _)| *rank);

                let mut groups: Vec<&Value> = Vec::new();
                for value in ordered.iter().filter_map(|(_, item)| get_path(item, group)) {
                    if !value.is_null() && !groups.contains(&value) {
                        groups.push(value);
                    }
                }
                // Any other group count is reported by `distinct_count`.
                let &[first, second] = groups.as_slice() else {
                    return Vec::new();
                };
                let partners: Vec<&Value> = items
                    .iter()
                    .filter(|item| get_path(item, group) == Some(second))
                    .filter_map(|item| get_path(item, key))
                    .collect();

                items
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| get_path(item, group) == Some(first))
                    .filter_map(|(i, item)| {
                        let own = get_path(item, key)?;
                        if partners.iter().any(|p| same_key(p, own)) {
                            return None;
                        }
                        Some(inconsistent(
                            &join_key(&join_index(array, i), key),
                            format!("{}: no element of group {} has {} {}", id, second, key, own),
                            format!("a partner in group {}", second),
                            own.clone(),
                        ))
                    })
                    .collect()
            }

            Assertion::Product { factors, array } => {
                let mut product: i64 = 1;
                for factor in factors {
                    match get_path(record, factor).map(parse_integer) {
                        Some(Ok(n)) => product = product.saturating_mul(n),
                        _ => return Vec::new(),
                    }
                }
                let Some(items) = get_path(record, array).and_then(Value::as_array) else {
                    return Vec::new();
                };
                if product <= 0 || items.len() as i64 == product {
                    return Vec::new();
                }
                vec![inconsistent(
                    array,
                    format!(
                        "{}: expected {} element(s) from {}, found {}",
                        id,
                        product,
                        factors.join(" × "),
                        items.len()
                    ),
                    format!("{} elements", product),
                    Value::from(items.len()),
                )]
            }

            Assertion::CatalogName {
                code,
                name,
                catalog,
            } => {
                let (Some(code_value), Some(name_value)) = (
                    get_path(record, code).and_then(Value::as_str),
                    get_path(record, name),
                ) else {
                    return Vec::new();
                };
                let Some(expected) = catalog.name_of(code_value) else {
                    return Vec::new();
                };
                if name_value.as_str() == Some(expected) {
                    return Vec::new();
                }
                vec![inconsistent(
                    name,
                    format!("{}: got {}, expected '{}' for code '{}'", id, name_value, expected, code_value),
                    expected,
                    name_value.clone(),
                )]
            }

            Assertion::NumericFormat { value, format } => {
                let (Some(raw), Some(kind_name)) = (
                    get_path(record, value),
                    get_path(record, format).and_then(Value::as_str),
                ) else {
                    return Vec::new();
                };
                let text = match raw {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return Vec::new(),
                };
                let parses = match kind_name {
                    "integer" => text.parse::<i64>().is_ok(),
                    "decimal" => text.parse::<f64>().map_or(false, f64::is_finite),
                    _ => return Vec::new(),
                };
                if parses {
                    return Vec::new();
                }
                vec![inconsistent(
                    value,
                    format!("{}: '{}' is not a valid {}", id, text, kind_name),
                    kind_name,
                    raw.clone(),
                )]
            }

            Assertion::WrappedInTag {
                field,
                tag,
                pattern,
            } => {
                let Some(html) = get_path(record, field).and_then(Value::as_str) else {
                    return Vec::new();
                };
                if html.trim().is_empty() {
                    return Vec::new();
                }
                let pattern = pattern.get_or_init(|| tag_pattern(tag));
                let closing = format!("</{}>", tag.to_lowercase());
                let single = pattern.as_ref().map_or(false, |p| p.is_match(html))
                    && html.to_lowercase().matches(&closing).count() == 1;
                if single {
                    return Vec::new();
                }
                vec![Violation::new(
                    field.clone(),
                    ViolationKind::Inconsistent,
                    format!("{}: must contain exactly one top-level <{}> element", id, tag),
                )
                .with_expected(format!("<{}>…</{}>", tag, tag))]
            }
        }
    }
}

fn tag_pattern(tag: &str) -> Option<Regex> {
    let escaped = regex::escape(tag);
    Regex::new(&format!(r"(?is)^\s*<{0}(\s[^>]*)?>.*</{0}>\s*$", escaped)).ok()
}

fn inconsistent(path: &str, message: String, expected: impl Into<String>, observed: Value) -> Violation {
    Violation::new(path, ViolationKind::Inconsistent, message)
        .with_expected(expected)
        .with_observed(observed)
}

/// Integer keys compare by value, so `1` and `"1"` pair up.
fn same_key(a: &Value, b: &Value) -> bool {
    match (parse_integer(a), parse_integer(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => !a.is_null() && a == b,
    }
}

fn describe_range(min: Option<usize>, max: Option<usize>) -> String {
    match (min, max) {
        (Some(min), Some(max)) if min == max => format!("exactly {}", min),
        (Some(min), Some(max)) => format!("between {} and {}", min, max),
        (Some(min), None) => format!("at least {}", min),
        (None, Some(max)) => format!("at most {}", max),
        (None, None) => "any number of".to_string(),
    }
}
