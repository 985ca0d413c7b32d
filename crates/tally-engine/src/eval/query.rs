//! Compiled query representation.
//!
//! Counter conditions arrive as dynamic JSON trees whose keys may be
//! operators or field paths. They are compiled once into a tagged variant
//! so that per-fact evaluation walks an explicit AST instead of
//! re-inspecting JSON shapes. Compilation never fails: anything malformed
//! becomes an `Invalid` node, which evaluates to `false` with a debug log
//! line.

use regex::Regex;
use serde_json::{Map, Value};

use super::expr::ExprNode;

/// A compiled query tree.
#[derive(Debug, Clone)]
pub enum Query {
    /// The empty (or null) query: matches every fact.
    All,
    /// Every sub-query must match. Vacuously true when empty.
    And(Vec<Query>),
    /// Any sub-query must match. An empty list matches nothing.
    Or(Vec<Query>),
    /// Inverts the single sub-query.
    Not(Box<Query>),
    /// An `$expr` expression coerced to boolean.
    Expr(ExprNode),
    /// A dotted field path tested against a matcher.
    Field(String, Matcher),
    /// Anything the language does not cover; evaluates to `false`.
    Invalid(String),
}

/// The matcher applied to one resolved field value.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Literal equality; an array literal doubles as a membership test.
    Value(Value),
    /// Operator mapping; all operators must hold (implicit AND).
    Ops(Vec<MatchOp>),
    /// Plain-field mapping: structural equality, recursive.
    Object(Vec<(String, Matcher)>),
}

/// A single field-level operator.
#[derive(Debug, Clone)]
pub enum MatchOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    Size(u64),
    Exists(bool),
    Type(String),
    Mod(i64, i64),
    Regex(Regex),
    Not(Box<Matcher>),
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Invalid(String),
}

impl Query {
    /// Compile a raw JSON query tree.
    ///
    /// A null or empty-object query compiles to [`Query::All`]; a
    /// multi-key mapping compiles to an implicit AND over its entries.
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Null => Query::All,
            Value::Object(map) if map.is_empty() => Query::All,
            Value::Object(map) => {
                let mut clauses: Vec<Query> = map
                    .iter()
                    .map(|(key, sub)| Self::parse_clause(key, sub))
                    .collect();
                if clauses.len() == 1 {
                    clauses.remove(0)
                } else {
                    Query::And(clauses)
                }
            }
            _ => Query::Invalid("query must be an object".to_string()),
        }
    }

    fn parse_clause(key: &str, value: &Value) -> Self {
        match key {
            "$expr" => Query::Expr(ExprNode::parse(value)),
            "$and" => match value.as_array() {
                Some(items) => Query::And(items.iter().map(Self::parse).collect()),
                None => Query::Invalid("$and expects an array".to_string()),
            },
            "$or" => match value.as_array() {
                Some(items) => Query::Or(items.iter().map(Self::parse).collect()),
                None => Query::Invalid("$or expects an array".to_string()),
            },
            "$not" => Query::Not(Box::new(Self::parse(value))),
            key if key.starts_with('$') => {
                Query::Invalid(format!("unknown query operator '{key}'"))
            }
            path => Query::Field(path.to_string(), Matcher::parse(value)),
        }
    }
}

impl Matcher {
    /// Compile the value side of a field predicate.
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Object(map) if !map.is_empty() => {
                let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
                if operator_keys == map.len() {
                    Matcher::Ops(parse_ops(map))
                } else if operator_keys == 0 {
                    Matcher::Object(
                        map.iter()
                            .map(|(k, sub)| (k.clone(), Matcher::parse(sub)))
                            .collect(),
                    )
                } else {
                    Matcher::Ops(vec![MatchOp::Invalid(
                        "matcher mixes operators and plain fields".to_string(),
                    )])
                }
            }
            other => Matcher::Value(other.clone()),
        }
    }
}

fn parse_ops(map: &Map<String, Value>) -> Vec<MatchOp> {
    let options = map.get("$options").and_then(Value::as_str).unwrap_or("");
    let mut ops = Vec::with_capacity(map.len());

    for (key, value) in map {
        let op = match key.as_str() {
            // Consumed together with $regex.
            "$options" => continue,
            "$eq" => MatchOp::Eq(value.clone()),
            "$ne" => MatchOp::Ne(value.clone()),
            "$gt" => MatchOp::Gt(value.clone()),
            "$gte" => MatchOp::Gte(value.clone()),
            "$lt" => MatchOp::Lt(value.clone()),
            "$lte" => MatchOp::Lte(value.clone()),
            "$in" => parse_array_op(value, MatchOp::In, "$in"),
            "$nin" => parse_array_op(value, MatchOp::Nin, "$nin"),
            "$all" => parse_array_op(value, MatchOp::All, "$all"),
            "$size" => match value.as_u64() {
                Some(n) => MatchOp::Size(n),
                None => MatchOp::Invalid("$size expects a non-negative integer".to_string()),
            },
            "$exists" => parse_exists(value),
            "$type" => match value.as_str() {
                Some(name) => MatchOp::Type(name.to_string()),
                None => MatchOp::Invalid("$type expects a type name".to_string()),
            },
            "$mod" => parse_mod(value),
            "$regex" => parse_regex(value, options),
            "$not" => MatchOp::Not(Box::new(Matcher::parse(value))),
            "$and" => match value.as_array() {
                Some(items) => MatchOp::And(items.iter().map(Matcher::parse).collect()),
                None => MatchOp::Invalid("$and expects an array".to_string()),
            },
            "$or" => match value.as_array() {
                Some(items) => MatchOp::Or(items.iter().map(Matcher::parse).collect()),
                None => MatchOp::Invalid("$or expects an array".to_string()),
            },
            other => MatchOp::Invalid(format!("unknown operator '{other}'")),
        };
        ops.push(op);
    }
    ops
}

fn parse_array_op(
    value: &Value,
    build: impl FnOnce(Vec<Value>) -> MatchOp,
    name: &str,
) -> MatchOp {
    match value.as_array() {
        Some(items) => build(items.clone()),
        None => MatchOp::Invalid(format!("{name} expects an array")),
    }
}

fn parse_exists(value: &Value) -> MatchOp {
    match value {
        Value::Bool(b) => MatchOp::Exists(*b),
        Value::Number(n) => MatchOp::Exists(n.as_f64().is_some_and(|f| f != 0.0)),
        _ => MatchOp::Invalid("$exists expects a boolean".to_string()),
    }
}

fn parse_mod(value: &Value) -> MatchOp {
    let invalid = || MatchOp::Invalid("$mod expects [divisor, remainder]".to_string());
    let Some(items) = value.as_array() else {
        return invalid();
    };
    if items.len() != 2 {
        return invalid();
    }
    let (Some(divisor), Some(remainder)) = (items[0].as_f64(), items[1].as_f64()) else {
        return invalid();
    };
    if divisor.fract() != 0.0 || remainder.fract() != 0.0 || divisor == 0.0 {
        return invalid();
    }
    MatchOp::Mod(divisor as i64, remainder as i64)
}

fn parse_regex(value: &Value, options: &str) -> MatchOp {
    let Some(pattern) = value.as_str() else {
        return MatchOp::Invalid("$regex expects a string pattern".to_string());
    };
    let flags: String = options.chars().filter(|c| "ims".contains(*c)).collect();
    let full = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{flags}){pattern}")
    };
    match Regex::new(&full) {
        Ok(re) => MatchOp::Regex(re),
        Err(e) => MatchOp::Invalid(format!("invalid $regex: {e}")),
    }
}
