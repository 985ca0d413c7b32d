//! Evaluation of compiled queries against facts.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use super::compare;
use super::expr::{self, ExprValue};
use super::query::{MatchOp, Matcher, Query};
use super::EvalCtx;

pub(crate) fn eval_query(query: &Query, ctx: &EvalCtx) -> bool {
    match query {
        Query::All => true,
        Query::And(clauses) => clauses.iter().all(|c| eval_query(c, ctx)),
        Query::Or(clauses) => !clauses.is_empty() && clauses.iter().any(|c| eval_query(c, ctx)),
        Query::Not(clause) => !eval_query(clause, ctx),
        Query::Expr(node) => expr::eval_bool(node, ctx),
        Query::Field(path, matcher) => {
            let value = ctx.resolve(path);
            eval_matcher(value.as_deref(), matcher, ctx)
        }
        Query::Invalid(reason) => {
            debug!(reason = %reason, "invalid query; treating as non-matching");
            false
        }
    }
}

fn eval_matcher(value: Option<&Value>, matcher: &Matcher, ctx: &EvalCtx) -> bool {
    if value.is_none() && ctx.undefined_is_true {
        return true;
    }
    match matcher {
        Matcher::Value(expected) => match value {
            Some(value) => value_matches(value, expected),
            None => false,
        },
        Matcher::Ops(ops) => ops.iter().all(|op| eval_op(value, op, ctx)),
        Matcher::Object(fields) => match value {
            Some(Value::Object(obj)) => fields
                .iter()
                .all(|(key, sub)| eval_matcher(obj.get(key), sub, ctx)),
            _ => false,
        },
    }
}

/// Literal equality with the array conveniences: an array matcher doubles
/// as a membership test, and an array field matches a scalar matcher when
/// any element does.
fn value_matches(value: &Value, expected: &Value) -> bool {
    if let Value::Array(options) = expected {
        if compare::loose_eq(value, expected) {
            return true;
        }
        return options.iter().any(|option| compare::loose_eq(value, option));
    }
    if let Value::Array(items) = value {
        if items.iter().any(|item| compare::loose_eq(item, expected)) {
            return true;
        }
    }
    compare::loose_eq(value, expected)
}

fn eval_op(value: Option<&Value>, op: &MatchOp, ctx: &EvalCtx) -> bool {
    match op {
        MatchOp::Eq(operand) => op_eq(value, operand, ctx),
        MatchOp::Ne(operand) => !op_eq(value, operand, ctx),
        MatchOp::Gt(operand) => op_cmp(value, operand, ctx) == Some(Ordering::Greater),
        MatchOp::Gte(operand) => matches!(
            op_cmp(value, operand, ctx),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        MatchOp::Lt(operand) => op_cmp(value, operand, ctx) == Some(Ordering::Less),
        MatchOp::Lte(operand) => matches!(
            op_cmp(value, operand, ctx),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        MatchOp::In(list) => value.is_some_and(|v| in_list(v, list)),
        MatchOp::Nin(list) => !value.is_some_and(|v| in_list(v, list)),
        MatchOp::All(required) => match value {
            Some(Value::Array(items)) => required
                .iter()
                .all(|r| items.iter().any(|item| compare::loose_eq(item, r))),
            _ => false,
        },
        MatchOp::Size(expected) => match value {
            Some(Value::Array(items)) => items.len() as u64 == *expected,
            _ => false,
        },
        MatchOp::Exists(expected) => value.is_some() == *expected,
        MatchOp::Type(name) => value.is_some_and(|v| type_matches(v, name)),
        MatchOp::Mod(divisor, remainder) => value
            .and_then(compare::coerced_number)
            .is_some_and(|n| (n.trunc() as i64) % divisor == *remainder),
        MatchOp::Regex(re) => value.and_then(Value::as_str).is_some_and(|s| re.is_match(s)),
        MatchOp::Not(inner) => !eval_matcher(value, inner, ctx),
        MatchOp::And(matchers) => matchers.iter().all(|m| eval_matcher(value, m, ctx)),
        MatchOp::Or(matchers) => {
            !matchers.is_empty() && matchers.iter().any(|m| eval_matcher(value, m, ctx))
        }
        MatchOp::Invalid(reason) => {
            debug!(reason = %reason, "unsupported matcher; treating as non-matching");
            false
        }
    }
}

/// An operand of `$eq`/`$ne` and the ordered operators, after resolving the
/// dynamic forms: `$$NOW` and the date-expression objects.
enum Resolved<'a> {
    Lit(&'a Value),
    Date(DateTime<Utc>),
    Num(f64),
    Undef,
}

fn resolve_operand<'a>(operand: &'a Value, ctx: &EvalCtx) -> Resolved<'a> {
    match operand {
        Value::String(s) if s == "$$NOW" => Resolved::Date(ctx.now),
        Value::Object(map)
            if map.len() == 1 && map.keys().next().is_some_and(|k| expr::is_date_operator(k)) =>
        {
            match expr::eval_value_operand(operand, ctx) {
                Some(ExprValue::Date(d)) => Resolved::Date(d),
                Some(ExprValue::Num(n)) => Resolved::Num(n),
                _ => Resolved::Undef,
            }
        }
        other => Resolved::Lit(other),
    }
}

fn op_eq(value: Option<&Value>, operand: &Value, ctx: &EvalCtx) -> bool {
    match resolve_operand(operand, ctx) {
        Resolved::Date(d) => value
            .and_then(compare::date_of)
            .is_some_and(|vd| vd.timestamp_millis() == d.timestamp_millis()),
        Resolved::Num(n) => value
            .and_then(compare::coerced_number)
            .is_some_and(|vn| vn == n),
        Resolved::Lit(expected) => match value {
            Some(value) => compare::loose_eq(value, expected),
            None => false,
        },
        Resolved::Undef => false,
    }
}

fn op_cmp(value: Option<&Value>, operand: &Value, ctx: &EvalCtx) -> Option<Ordering> {
    let value = value?;
    match resolve_operand(operand, ctx) {
        Resolved::Date(d) => compare::date_of(value)
            .map(|vd| vd.timestamp_millis().cmp(&d.timestamp_millis())),
        Resolved::Num(n) => compare::coerced_number(value).and_then(|vn| vn.partial_cmp(&n)),
        Resolved::Lit(expected) => compare::loose_cmp(value, expected),
        Resolved::Undef => None,
    }
}

fn in_list(value: &Value, list: &[Value]) -> bool {
    if let Value::Array(items) = value {
        if items
            .iter()
            .any(|item| list.iter().any(|l| compare::loose_eq(item, l)))
        {
            return true;
        }
    }
    list.iter().any(|l| compare::loose_eq(value, l))
}

fn type_matches(value: &Value, name: &str) -> bool {
    match name {
        // Only RFC 3339 strings qualify as dates; they still match "string".
        "date" => matches!(value, Value::String(s)
            if chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        "bool" | "boolean" => value.is_boolean(),
        other => compare::type_name(value) == other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{matches_at, matches_value, MatchOptions, Query};
    use serde_json::json;
    use tally_core::Fact;

    fn fact(payload: Value) -> Fact {
        Fact::new(50, payload.as_object().cloned().unwrap())
    }

    fn check(payload: Value, query: Value) -> bool {
        matches_value(&fact(payload), &query, &MatchOptions::default())
    }

    #[test]
    fn test_scalar_equality() {
        assert!(check(json!({"status": "A"}), json!({"d.status": "A"})));
        assert!(!check(json!({"status": "A"}), json!({"d.status": "R"})));
        assert!(check(json!({"amount": 1000}), json!({"d.amount": "1,000"})));
        assert!(check(json!({"flag": null}), json!({"d.flag": null})));
        assert!(!check(json!({}), json!({"d.flag": null})));
    }

    #[test]
    fn test_array_matcher_is_membership() {
        assert!(check(json!({"code": 50}), json!({"d.code": [50, 70]})));
        assert!(!check(json!({"code": 50}), json!({"d.code": [60]})));
        assert!(check(json!({"codes": [1, 2]}), json!({"d.codes": [[1, 2]]})));
    }

    #[test]
    fn test_array_field_scalar_matcher() {
        assert!(check(json!({"tags": ["x", "y"]}), json!({"d.tags": "x"})));
        assert!(!check(json!({"tags": ["x", "y"]}), json!({"d.tags": "z"})));
    }

    #[test]
    fn test_eq_ne_inversion() {
        let payload = json!({"status": "A"});
        assert!(check(payload.clone(), json!({"d.status": {"$eq": "A"}})));
        assert!(!check(payload.clone(), json!({"d.status": {"$ne": "A"}})));
        assert!(check(payload.clone(), json!({"d.status": {"$ne": "R"}})));
        assert!(!check(payload, json!({"d.status": {"$eq": "R"}})));
    }

    #[test]
    fn test_ordered_operators() {
        let payload = json!({"amount": "1,500"});
        assert!(check(payload.clone(), json!({"d.amount": {"$gt": 1000}})));
        assert!(check(payload.clone(), json!({"d.amount": {"$gte": 1500}})));
        assert!(check(payload.clone(), json!({"d.amount": {"$lte": "1500"}})));
        assert!(!check(payload.clone(), json!({"d.amount": {"$lt": 1500}})));
        // No defined order against a non-numeric string.
        assert!(!check(payload, json!({"d.amount": {"$gt": "high"}})));
    }

    #[test]
    fn test_lexicographic_ordering() {
        assert!(check(json!({"name": "banana"}), json!({"d.name": {"$gt": "apple"}})));
        assert!(!check(json!({"name": "apple"}), json!({"d.name": {"$gt": "banana"}})));
    }

    #[test]
    fn test_in_nin_inversion_and_empty() {
        let payload = json!({"mti": "0200"});
        assert!(check(payload.clone(), json!({"d.mti": {"$in": ["0200", "0210"]}})));
        assert!(!check(payload.clone(), json!({"d.mti": {"$nin": ["0200", "0210"]}})));
        assert!(check(payload.clone(), json!({"d.mti": {"$nin": ["0400", "0410"]}})));
        assert!(!check(payload.clone(), json!({"d.mti": {"$in": []}})));
        assert!(check(payload, json!({"d.mti": {"$nin": []}})));
    }

    #[test]
    fn test_nin_on_missing_field_matches() {
        assert!(check(json!({}), json!({"d.mti": {"$nin": ["0400"]}})));
        assert!(!check(json!({}), json!({"d.mti": {"$in": ["0400"]}})));
    }

    #[test]
    fn test_all_and_size() {
        let payload = json!({"tags": ["a", "b", "c"]});
        assert!(check(payload.clone(), json!({"d.tags": {"$all": ["a", "c"]}})));
        assert!(!check(payload.clone(), json!({"d.tags": {"$all": ["a", "z"]}})));
        assert!(check(payload.clone(), json!({"d.tags": {"$size": 3}})));
        assert!(!check(payload.clone(), json!({"d.tags": {"$size": 2}})));
        assert!(!check(json!({"tags": "a"}), json!({"d.tags": {"$all": ["a"]}})));
        assert!(!check(payload, json!({"d.missing": {"$size": 0}})));
    }

    #[test]
    fn test_exists_distinguishes_null_from_absent() {
        assert!(check(json!({"x": null}), json!({"d.x": {"$exists": true}})));
        assert!(!check(json!({"x": null}), json!({"d.x": {"$exists": false}})));
        assert!(check(json!({}), json!({"d.x": {"$exists": false}})));
        assert!(!check(json!({}), json!({"d.x": {"$exists": true}})));
    }

    #[test]
    fn test_type_operator() {
        assert!(check(json!({"x": "abc"}), json!({"d.x": {"$type": "string"}})));
        assert!(check(json!({"x": 1}), json!({"d.x": {"$type": "number"}})));
        assert!(check(json!({"x": [1]}), json!({"d.x": {"$type": "array"}})));
        assert!(check(json!({"x": null}), json!({"d.x": {"$type": "null"}})));
        assert!(check(
            json!({"x": "2026-08-01T00:00:00Z"}),
            json!({"d.x": {"$type": "date"}})
        ));
        assert!(check(
            json!({"x": "2026-08-01T00:00:00Z"}),
            json!({"d.x": {"$type": "string"}})
        ));
        assert!(!check(json!({"x": "not a date"}), json!({"d.x": {"$type": "date"}})));
    }

    #[test]
    fn test_mod_operator() {
        assert!(check(json!({"n": 12}), json!({"d.n": {"$mod": [4, 0]}})));
        assert!(!check(json!({"n": 13}), json!({"d.n": {"$mod": [4, 0]}})));
        assert!(check(json!({"n": "13"}), json!({"d.n": {"$mod": [4, 1]}})));
    }

    #[test]
    fn test_regex_with_flags() {
        assert!(check(json!({"doc": "123456"}), json!({"d.doc": {"$regex": "^12"}})));
        assert!(!check(json!({"doc": "123456"}), json!({"d.doc": {"$regex": "^7"}})));
        assert!(check(
            json!({"doc": "ABC"}),
            json!({"d.doc": {"$regex": "^abc$", "$options": "i"}})
        ));
        assert!(check(
            json!({"doc": "a\nb"}),
            json!({"d.doc": {"$regex": "^b", "$options": "m"}})
        ));
        assert!(check(
            json!({"doc": "a\nb"}),
            json!({"d.doc": {"$regex": "a.b", "$options": "s"}})
        ));
        assert!(!check(json!({"doc": 123456}), json!({"d.doc": {"$regex": "^12"}})));
    }

    #[test]
    fn test_not_wraps_matchers() {
        assert!(check(
            json!({"doc": "123456"}),
            json!({"d.doc": {"$not": {"$regex": "^7"}}})
        ));
        assert!(!check(
            json!({"doc": "723456"}),
            json!({"d.doc": {"$not": {"$regex": "^7"}}})
        ));
        assert!(check(json!({"x": 5}), json!({"d.x": {"$not": {"$gt": 10}}})));
    }

    #[test]
    fn test_field_scoped_and_or() {
        assert!(check(
            json!({"x": 5}),
            json!({"d.x": {"$and": [{"$gt": 1}, {"$lt": 10}]}})
        ));
        assert!(check(
            json!({"x": 5}),
            json!({"d.x": {"$or": [{"$gt": 10}, {"$eq": 5}]}})
        ));
        assert!(!check(json!({"x": 5}), json!({"d.x": {"$or": []}})));
    }

    #[test]
    fn test_top_level_logic() {
        let payload = json!({"a": 1, "b": 2});
        assert!(check(
            payload.clone(),
            json!({"$and": [{"d.a": 1}, {"d.b": 2}]})
        ));
        assert!(check(
            payload.clone(),
            json!({"$or": [{"d.a": 9}, {"d.b": 2}]})
        ));
        assert!(!check(payload.clone(), json!({"$or": []})));
        assert!(check(payload.clone(), json!({"$not": {"d.a": 9}})));
        assert!(!check(payload, json!({"$not": {"d.a": 1}})));
    }

    #[test]
    fn test_structural_matcher() {
        let payload = json!({"card": {"scheme": "visa", "limits": {"daily": 500}}});
        assert!(check(
            payload.clone(),
            json!({"d.card": {"scheme": "visa", "limits": {"daily": {"$gte": 100}}}})
        ));
        assert!(!check(payload, json!({"d.card": {"scheme": "amex"}})));
        assert!(!check(json!({"card": "visa"}), json!({"d.card": {"scheme": "visa"}})));
    }

    #[test]
    fn test_dynamic_date_operand() {
        let now: DateTime<Utc> = "2026-08-01T12:00:00Z".parse().unwrap();
        let f = fact(json!({"dt": "2026-08-01T11:30:00Z"}));
        let q = Query::parse(&json!({
            "d.dt": {"$gte": {"$dateAdd": {"startDate": "$$NOW", "unit": "hour", "amount": -1}}}
        }));
        assert!(matches_at(&f, &q, now, &MatchOptions::default()));

        let f = fact(json!({"dt": "2026-07-30T12:00:00Z"}));
        let q = Query::parse(&json!({
            "d.dt": {"$gte": {"$dateAdd": {"startDate": "$$NOW", "unit": "day", "amount": -1}}}
        }));
        assert!(!matches_at(&f, &q, now, &MatchOptions::default()));
    }

    #[test]
    fn test_now_literal_operand() {
        let now: DateTime<Utc> = "2026-08-01T12:00:00Z".parse().unwrap();
        let f = fact(json!({"dt": "2026-08-01T11:00:00Z"}));
        let q = Query::parse(&json!({"d.dt": {"$lt": "$$NOW"}}));
        assert!(matches_at(&f, &q, now, &MatchOptions::default()));
        let q = Query::parse(&json!({"d.dt": {"$gt": "$$NOW"}}));
        assert!(!matches_at(&f, &q, now, &MatchOptions::default()));
    }

    #[test]
    fn test_undefined_is_true_policy() {
        let f = fact(json!({"present": 1}));
        let opts = MatchOptions {
            undefined_is_true: true,
            ..Default::default()
        };
        assert!(matches_value(&f, &json!({"d.missing": {"$eq": 5}}), &opts));
        assert!(matches_value(&f, &json!({"d.missing": "x"}), &opts));
        // Present fields still evaluate normally.
        assert!(!matches_value(&f, &json!({"d.present": {"$eq": 5}}), &opts));
    }

    #[test]
    fn test_epoch_millis_compare_against_date() {
        let now: DateTime<Utc> = "2026-08-01T12:00:00Z".parse().unwrap();
        let dt_ms = now.timestamp_millis() - 30 * 60 * 1000;
        let f = fact(json!({"dt": dt_ms}));
        let q = Query::parse(&json!({
            "d.dt": {"$gte": {"$dateAdd": {"startDate": "$$NOW", "unit": "hour", "amount": -1}}}
        }));
        assert!(matches_at(&f, &q, now, &MatchOptions::default()));
    }
}
