//! Type-loose comparison primitives shared by the field operators and the
//! `$expr` sub-language.
//!
//! The coercion contract: a value is treated as numeric when, after
//! stripping spaces and thousands separators, it matches a decimal literal.
//! Comparisons between a parseable string and a number use numeric
//! comparison; between two parseable strings, numeric; otherwise the native
//! comparison of the two typed values.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Parse a decimal literal after stripping spaces and thousands commas.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    let body = cleaned.strip_prefix(['+', '-']).unwrap_or(&cleaned);
    if body.is_empty() {
        return None;
    }
    // Reject hex/inf/nan spellings that f64::parse would accept.
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// The numeric view of a value, if it has one.
pub fn coerced_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

/// The date view of a value: RFC 3339 strings and epoch-millisecond
/// numbers. Only consulted when the other side of a comparison is known to
/// be a date.
pub fn date_of(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Type-loose equality.
pub fn loose_eq(v: &Value, m: &Value) -> bool {
    if let (Some(a), Some(b)) = (coerced_number(v), coerced_number(m)) {
        return a == b;
    }
    match (v, m) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, av)| b.get(k).is_some_and(|bv| loose_eq(av, bv)))
        }
        _ => false,
    }
}

/// Type-loose ordering. `None` when the two values have no defined order,
/// which every ordered operator treats as a non-match.
pub fn loose_cmp(v: &Value, m: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (coerced_number(v), coerced_number(m)) {
        return a.partial_cmp(&b);
    }
    match (v, m) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Dynamic-type name used by the `$type` operator.
pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
