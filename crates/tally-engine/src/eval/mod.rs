//! Condition evaluator: a pure, fact-local interpreter of a MongoDB-style
//! query language.
//!
//! The entry points are [`matches`] / [`matches_at`] over a compiled
//! [`Query`], and [`matches_value`] for one-shot evaluation of a raw JSON
//! query tree. Evaluation is deterministic given identical inputs and
//! "now", performs no I/O, and never fails: malformed queries evaluate to
//! `false` with a debug log line.
//!
//! All relative-time resolution (`$$NOW`, `$dateAdd`, …) uses a single
//! timestamp captured at the start of each match call, so multiple
//! references within one expression see a consistent "now".

pub mod compare;
pub mod expr;
pub mod ops;
pub mod query;

pub use query::{MatchOp, Matcher, Query};

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde_json::Value;

use tally_core::config::DEFAULT_MESSAGE_TYPE_FIELD;
use tally_core::Fact;

/// Per-call evaluation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOptions {
    /// When set, absence of the field on the left of any leaf comparison
    /// yields `true` instead of `false`. Used by the affected-counters pass
    /// to over-approximate.
    pub undefined_is_true: bool,

    /// Field name resolving to the fact's integer type discriminator.
    pub message_type_field: String,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            undefined_is_true: false,
            message_type_field: DEFAULT_MESSAGE_TYPE_FIELD.to_string(),
        }
    }
}

/// Shared evaluation state for one match call.
pub(crate) struct EvalCtx<'a> {
    pub fact: &'a Fact,
    pub now: DateTime<Utc>,
    pub undefined_is_true: bool,
    pub type_field: &'a str,
}

impl<'a> EvalCtx<'a> {
    /// Resolve a dotted field path against the fact.
    ///
    /// The message-type field resolves to the fact's type discriminator,
    /// `id` and `createdAt` to the envelope attributes, everything else to
    /// the payload (`d.`-rooted or bare). `None` means undefined, which the
    /// evaluator keeps distinct from an explicit `null`.
    pub fn resolve(&self, path: &str) -> Option<Cow<'a, Value>> {
        if path == self.type_field {
            return Some(Cow::Owned(Value::from(self.fact.fact_type)));
        }
        match path {
            "id" => Some(Cow::Owned(Value::String(self.fact.id.clone()))),
            "createdAt" => Some(Cow::Owned(Value::from(
                self.fact.created_at.timestamp_millis(),
            ))),
            _ => self.fact.payload_at(path).map(Cow::Borrowed),
        }
    }
}

/// Test a fact against a compiled query, capturing "now" once.
pub fn matches(fact: &Fact, query: &Query, opts: &MatchOptions) -> bool {
    matches_at(fact, query, Utc::now(), opts)
}

/// Test a fact against a compiled query with an explicit NOW anchor.
pub fn matches_at(fact: &Fact, query: &Query, now: DateTime<Utc>, opts: &MatchOptions) -> bool {
    let ctx = EvalCtx {
        fact,
        now,
        undefined_is_true: opts.undefined_is_true,
        type_field: &opts.message_type_field,
    };
    ops::eval_query(query, &ctx)
}

/// One-shot evaluation of a raw JSON query tree.
///
/// An empty or null query matches every fact.
pub fn matches_value(fact: &Fact, query: &Value, opts: &MatchOptions) -> bool {
    matches(fact, &Query::parse(query), opts)
}
