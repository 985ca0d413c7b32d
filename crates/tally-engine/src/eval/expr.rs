//! The `$expr` expression sub-language.
//!
//! Operands are literals, `$d.…` path references resolved against the
//! fact, the `$$NOW` anchor, or nested expressions. Date helpers are
//! distinct nodes with typed fields. An invalid date, missing parameter,
//! or unknown unit makes the whole surrounding expression evaluate to
//! `false`; expression evaluation never throws.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde_json::Value;
use tracing::debug;

use super::compare;
use super::EvalCtx;

/// A compiled expression node.
#[derive(Debug, Clone)]
pub enum ExprNode {
    Cmp(CmpKind, Box<ExprOperand>, Box<ExprOperand>),
    And(Vec<ExprOperand>),
    Or(Vec<ExprOperand>),
    DateAdd(DateShift),
    DateSubtract(DateShift),
    DateDiff {
        start: Box<ExprOperand>,
        end: Box<ExprOperand>,
        unit: Option<DateUnit>,
    },
    Invalid(String),
}

/// Comparison kind shared by the six ordered/equality operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpKind {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Typed arguments of `$dateAdd` / `$dateSubtract`.
#[derive(Debug, Clone)]
pub struct DateShift {
    pub start: Box<ExprOperand>,
    pub unit: Option<DateUnit>,
    pub amount: Box<ExprOperand>,
}

/// Calendar unit of the date helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl DateUnit {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "week" => Some(Self::Week),
            "day" => Some(Self::Day),
            "hour" => Some(Self::Hour),
            "minute" => Some(Self::Minute),
            "second" => Some(Self::Second),
            "millisecond" => Some(Self::Millisecond),
            _ => None,
        }
    }
}

/// One operand of an expression.
#[derive(Debug, Clone)]
pub enum ExprOperand {
    Literal(Value),
    FieldRef(String),
    NowRef,
    Sub(Box<ExprNode>),
}

/// A resolved expression value.
#[derive(Debug, Clone)]
pub enum ExprValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Date(DateTime<Utc>),
    Json(Value),
}

enum Outcome {
    Value(ExprValue),
    Undefined,
    Error,
}

/// True for the operator keys that may appear as dynamic operands of field
/// comparisons (`{$gte: {$dateAdd: …}}`).
pub fn is_date_operator(key: &str) -> bool {
    matches!(key, "$dateAdd" | "$dateSubtract" | "$dateDiff")
}

impl ExprNode {
    /// Compile a raw expression tree. Never fails; malformed shapes become
    /// `Invalid` nodes.
    pub fn parse(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return ExprNode::Invalid("expression must be an object".to_string());
        };
        let mut entries = map.iter();
        let (Some((op, operands)), None) = (entries.next(), entries.next()) else {
            return ExprNode::Invalid("expression must carry exactly one operator".to_string());
        };

        match op.as_str() {
            "$eq" => Self::parse_cmp(CmpKind::Eq, operands),
            "$ne" => Self::parse_cmp(CmpKind::Ne, operands),
            "$gt" => Self::parse_cmp(CmpKind::Gt, operands),
            "$gte" => Self::parse_cmp(CmpKind::Gte, operands),
            "$lt" => Self::parse_cmp(CmpKind::Lt, operands),
            "$lte" => Self::parse_cmp(CmpKind::Lte, operands),
            "$and" => match operands.as_array() {
                Some(items) => ExprNode::And(items.iter().map(ExprOperand::parse).collect()),
                None => ExprNode::Invalid("$and expects an array".to_string()),
            },
            "$or" => match operands.as_array() {
                Some(items) => ExprNode::Or(items.iter().map(ExprOperand::parse).collect()),
                None => ExprNode::Invalid("$or expects an array".to_string()),
            },
            "$dateAdd" => Self::parse_shift(operands).map_or_else(
                || ExprNode::Invalid("$dateAdd requires startDate and amount".to_string()),
                ExprNode::DateAdd,
            ),
            "$dateSubtract" => Self::parse_shift(operands).map_or_else(
                || ExprNode::Invalid("$dateSubtract requires startDate and amount".to_string()),
                ExprNode::DateSubtract,
            ),
            "$dateDiff" => Self::parse_diff(operands),
            other => ExprNode::Invalid(format!("unknown expression operator '{other}'")),
        }
    }

    fn parse_cmp(kind: CmpKind, operands: &Value) -> Self {
        match operands.as_array() {
            Some(items) if items.len() == 2 => ExprNode::Cmp(
                kind,
                Box::new(ExprOperand::parse(&items[0])),
                Box::new(ExprOperand::parse(&items[1])),
            ),
            _ => ExprNode::Invalid("comparison expects two operands".to_string()),
        }
    }

    fn parse_shift(operands: &Value) -> Option<DateShift> {
        let args = operands.as_object()?;
        let start = args.get("startDate").map(ExprOperand::parse)?;
        let amount = args.get("amount").map(ExprOperand::parse)?;
        // A missing or unknown unit is kept as None and fails at evaluation.
        let unit = args.get("unit").and_then(Value::as_str).and_then(DateUnit::parse);
        Some(DateShift {
            start: Box::new(start),
            unit,
            amount: Box::new(amount),
        })
    }

    fn parse_diff(operands: &Value) -> Self {
        let Some(args) = operands.as_object() else {
            return ExprNode::Invalid("$dateDiff expects an object".to_string());
        };
        let (Some(start), Some(end)) = (args.get("startDate"), args.get("endDate")) else {
            return ExprNode::Invalid("$dateDiff requires startDate and endDate".to_string());
        };
        let unit = args.get("unit").and_then(Value::as_str).and_then(DateUnit::parse);
        ExprNode::DateDiff {
            start: Box::new(ExprOperand::parse(start)),
            end: Box::new(ExprOperand::parse(end)),
            unit,
        }
    }
}

impl ExprOperand {
    /// Compile one operand.
    ///
    /// `$$NOW` is the NOW anchor; `$…` and `$$…` strings are field/variable
    /// references; single-operator objects are nested expressions;
    /// everything else is a literal.
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::String(s) if s == "$$NOW" => ExprOperand::NowRef,
            Value::String(s) if s.starts_with("$$") => ExprOperand::FieldRef(s[2..].to_string()),
            Value::String(s) if s.starts_with('$') => ExprOperand::FieldRef(s[1..].to_string()),
            Value::Object(map)
                if map.len() == 1 && map.keys().next().is_some_and(|k| k.starts_with('$')) =>
            {
                ExprOperand::Sub(Box::new(ExprNode::parse(value)))
            }
            other => ExprOperand::Literal(other.clone()),
        }
    }
}

/// Evaluate an expression to a boolean, as `$expr` requires.
pub(crate) fn eval_bool(node: &ExprNode, ctx: &EvalCtx) -> bool {
    match eval_node(node, ctx) {
        Some(v) => truthy(&v),
        None => false,
    }
}

/// Evaluate a raw JSON value as an expression operand. Used by field
/// operators whose operand is a date-expression object.
pub(crate) fn eval_value_operand(value: &Value, ctx: &EvalCtx) -> Option<ExprValue> {
    eval_node(&ExprNode::parse(value), ctx)
}

fn eval_node(node: &ExprNode, ctx: &EvalCtx) -> Option<ExprValue> {
    match node {
        ExprNode::Cmp(kind, left, right) => eval_cmp(*kind, left, right, ctx),
        ExprNode::And(items) => eval_junction(items, ctx, true),
        ExprNode::Or(items) => eval_junction(items, ctx, false),
        ExprNode::DateAdd(shift) => eval_shift(shift, 1, ctx),
        ExprNode::DateSubtract(shift) => eval_shift(shift, -1, ctx),
        ExprNode::DateDiff { start, end, unit } => eval_date_diff(start, end, *unit, ctx),
        ExprNode::Invalid(reason) => {
            debug!(reason = %reason, "invalid expression");
            None
        }
    }
}

fn eval_cmp(
    kind: CmpKind,
    left: &ExprOperand,
    right: &ExprOperand,
    ctx: &EvalCtx,
) -> Option<ExprValue> {
    let left = eval_operand(left, ctx);
    let right = eval_operand(right, ctx);

    match (left, right) {
        (Outcome::Error, _) | (_, Outcome::Error) => None,
        (Outcome::Value(l), Outcome::Value(r)) => Some(ExprValue::Bool(cmp_holds(kind, &l, &r))),
        (Outcome::Undefined, Outcome::Undefined) => {
            if ctx.undefined_is_true {
                return Some(ExprValue::Bool(true));
            }
            Some(ExprValue::Bool(kind == CmpKind::Eq))
        }
        _ => {
            if ctx.undefined_is_true {
                return Some(ExprValue::Bool(true));
            }
            Some(ExprValue::Bool(kind == CmpKind::Ne))
        }
    }
}

fn eval_junction(items: &[ExprOperand], ctx: &EvalCtx, require_all: bool) -> Option<ExprValue> {
    let mut holds = require_all;
    for item in items {
        let item_truthy = match eval_operand(item, ctx) {
            Outcome::Error => return None,
            Outcome::Undefined => ctx.undefined_is_true,
            Outcome::Value(v) => truthy(&v),
        };
        if require_all {
            holds = holds && item_truthy;
        } else {
            holds = holds || item_truthy;
        }
    }
    Some(ExprValue::Bool(holds))
}

fn eval_operand(operand: &ExprOperand, ctx: &EvalCtx) -> Outcome {
    match operand {
        ExprOperand::Literal(v) => Outcome::Value(from_json(v)),
        ExprOperand::NowRef => Outcome::Value(ExprValue::Date(ctx.now)),
        ExprOperand::FieldRef(path) => match ctx.resolve(path) {
            Some(value) => Outcome::Value(from_json(&value)),
            None => Outcome::Undefined,
        },
        ExprOperand::Sub(node) => match eval_node(node, ctx) {
            Some(v) => Outcome::Value(v),
            None => Outcome::Error,
        },
    }
}

fn eval_shift(shift: &DateShift, sign: i64, ctx: &EvalCtx) -> Option<ExprValue> {
    let unit = shift.unit?;
    let start = operand_date(&shift.start, ctx)?;
    let amount = operand_num(&shift.amount, ctx)?;
    if !amount.is_finite() {
        return None;
    }
    let amount = (amount as i64).checked_mul(sign)?;
    shifted_date(start, unit, amount).map(ExprValue::Date)
}

fn shifted_date(start: DateTime<Utc>, unit: DateUnit, amount: i64) -> Option<DateTime<Utc>> {
    match unit {
        DateUnit::Year => shift_months(start, amount.checked_mul(12)?),
        DateUnit::Month => shift_months(start, amount),
        DateUnit::Week => start.checked_add_signed(Duration::try_weeks(amount)?),
        DateUnit::Day => start.checked_add_signed(Duration::try_days(amount)?),
        DateUnit::Hour => start.checked_add_signed(Duration::try_hours(amount)?),
        DateUnit::Minute => start.checked_add_signed(Duration::try_minutes(amount)?),
        DateUnit::Second => start.checked_add_signed(Duration::try_seconds(amount)?),
        DateUnit::Millisecond => start.checked_add_signed(Duration::try_milliseconds(amount)?),
    }
}

fn shift_months(start: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = u32::try_from(months.unsigned_abs()).ok()?;
    if months >= 0 {
        start.checked_add_months(Months::new(magnitude))
    } else {
        start.checked_sub_months(Months::new(magnitude))
    }
}

fn eval_date_diff(
    start: &ExprOperand,
    end: &ExprOperand,
    unit: Option<DateUnit>,
    ctx: &EvalCtx,
) -> Option<ExprValue> {
    let unit = unit?;
    let start = operand_date(start, ctx)?;
    let end = operand_date(end, ctx)?;
    let delta_ms = end.timestamp_millis() - start.timestamp_millis();

    // Whole units, truncated toward zero. Calendar units count month
    // boundaries actually crossed rather than dividing a fixed span.
    let diff = match unit {
        DateUnit::Millisecond => delta_ms,
        DateUnit::Second => delta_ms / 1_000,
        DateUnit::Minute => delta_ms / 60_000,
        DateUnit::Hour => delta_ms / 3_600_000,
        DateUnit::Day => delta_ms / 86_400_000,
        DateUnit::Week => delta_ms / 604_800_000,
        DateUnit::Month => months_between(start, end),
        DateUnit::Year => months_between(start, end) / 12,
    };
    Some(ExprValue::Num(diff as f64))
}

fn months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    if end < start {
        return -months_between(end, start);
    }
    let mut months = (i64::from(end.year()) - i64::from(start.year())) * 12
        + (i64::from(end.month()) - i64::from(start.month()));
    if (end.day(), end.time()) < (start.day(), start.time()) {
        months -= 1;
    }
    months.max(0)
}

fn operand_date(operand: &ExprOperand, ctx: &EvalCtx) -> Option<DateTime<Utc>> {
    match eval_operand(operand, ctx) {
        Outcome::Value(v) => as_date(&v),
        _ => None,
    }
}

fn operand_num(operand: &ExprOperand, ctx: &EvalCtx) -> Option<f64> {
    match eval_operand(operand, ctx) {
        Outcome::Value(v) => as_num(&v),
        _ => None,
    }
}

fn from_json(value: &Value) -> ExprValue {
    match value {
        Value::Null => ExprValue::Null,
        Value::Bool(b) => ExprValue::Bool(*b),
        Value::Number(n) => n.as_f64().map_or(ExprValue::Null, ExprValue::Num),
        Value::String(s) => ExprValue::Str(s.clone()),
        other => ExprValue::Json(other.clone()),
    }
}

fn as_date(value: &ExprValue) -> Option<DateTime<Utc>> {
    match value {
        ExprValue::Date(d) => Some(*d),
        ExprValue::Num(n) => DateTime::from_timestamp_millis(*n as i64),
        ExprValue::Str(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

fn as_num(value: &ExprValue) -> Option<f64> {
    match value {
        ExprValue::Num(n) => Some(*n),
        ExprValue::Str(s) => compare::parse_numeric(s),
        _ => None,
    }
}

fn cmp_holds(kind: CmpKind, left: &ExprValue, right: &ExprValue) -> bool {
    match kind {
        CmpKind::Eq => eq_values(left, right),
        CmpKind::Ne => !eq_values(left, right),
        CmpKind::Gt => cmp_values(left, right) == Some(Ordering::Greater),
        CmpKind::Gte => matches!(
            cmp_values(left, right),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        CmpKind::Lt => cmp_values(left, right) == Some(Ordering::Less),
        CmpKind::Lte => matches!(
            cmp_values(left, right),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
    }
}

fn eq_values(left: &ExprValue, right: &ExprValue) -> bool {
    match (left, right) {
        (ExprValue::Null, ExprValue::Null) => true,
        (ExprValue::Bool(a), ExprValue::Bool(b)) => a == b,
        (ExprValue::Json(a), ExprValue::Json(b)) => compare::loose_eq(a, b),
        _ => cmp_values(left, right) == Some(Ordering::Equal),
    }
}

fn cmp_values(left: &ExprValue, right: &ExprValue) -> Option<Ordering> {
    match (left, right) {
        (ExprValue::Date(a), b) => as_date(b).map(|d| a.timestamp_millis().cmp(&d.timestamp_millis())),
        (a, ExprValue::Date(b)) => as_date(a).map(|d| d.timestamp_millis().cmp(&b.timestamp_millis())),
        (ExprValue::Num(a), b) => as_num(b).and_then(|n| a.partial_cmp(&n)),
        (a, ExprValue::Num(b)) => as_num(a).and_then(|n| n.partial_cmp(b)),
        (ExprValue::Str(a), ExprValue::Str(b)) => {
            match (compare::parse_numeric(a), compare::parse_numeric(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => Some(a.cmp(b)),
            }
        }
        _ => None,
    }
}

fn truthy(value: &ExprValue) -> bool {
    match value {
        ExprValue::Null => false,
        ExprValue::Bool(b) => *b,
        ExprValue::Num(n) => *n != 0.0,
        ExprValue::Str(s) => !s.is_empty(),
        ExprValue::Date(_) => true,
        ExprValue::Json(_) => true,
    }
}
