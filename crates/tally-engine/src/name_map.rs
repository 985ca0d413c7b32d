//! Bidirectional field-name mapper.
//!
//! In compact mode, facts travel with short field names while counter
//! definitions are authored with long, readable names. The mapper rewrites
//! every field reference inside a query tree (nested query operators,
//! `$expr` operand paths, and `$$d.*` runtime variables included) so that
//! downstream evaluation sees only compact names, and translates short
//! names back for result reporting.
//!
//! The rewriter is shape-preserving (same tree topology, same operator
//! nodes) and idempotent: once every name is short, another application
//! changes nothing.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Prefix of counter-indicator fields, which are never mapped.
pub const INDICATOR_PREFIX: &str = "i_";

/// One rule of the name-map file. Other fields of the rule objects are
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameMapRule {
    /// Long authored field name.
    #[serde(default)]
    pub dst: Option<String>,

    /// Short on-the-wire field name.
    #[serde(rename = "shortDst", default)]
    pub short_dst: Option<String>,
}

/// The compiled map: `long→short` for rewriting authored queries and
/// `short→long` for translating results back.
#[derive(Debug, Default)]
pub struct FieldNameMap {
    active: bool,
    long_to_short: HashMap<String, String>,
    short_to_long: HashMap<String, String>,
}

impl FieldNameMap {
    /// Build the two lookup tables from a rule list.
    ///
    /// Conflicting rules (a duplicate long name, or two long names mapped
    /// to the same short name) are logged and the first rule wins.
    pub fn new(rules: Vec<NameMapRule>, active: bool) -> Self {
        let mut long_to_short = HashMap::new();
        let mut short_to_long = HashMap::new();

        for rule in rules {
            let (Some(long), Some(short)) = (rule.dst, rule.short_dst) else {
                continue;
            };
            if long_to_short.contains_key(&long) {
                warn!(field = %long, "duplicate name-map rule; keeping the first");
                continue;
            }
            if let Some(existing) = short_to_long.get(&short) {
                warn!(
                    short = %short,
                    kept = %existing,
                    dropped = %long,
                    "short name conflict; keeping the first rule"
                );
                continue;
            }
            long_to_short.insert(long.clone(), short.clone());
            short_to_long.insert(short, long);
        }

        Self {
            active,
            long_to_short,
            short_to_long,
        }
    }

    /// An empty, inactive map: every transform is the identity.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Load rules from a UTF-8 JSON array file.
    ///
    /// An absent path or a parse error yields an empty map with a warning;
    /// producer construction later fails if compact mode needs names the
    /// empty map cannot provide.
    pub fn from_file(path: impl AsRef<Path>, active: bool) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "name-map file unavailable; using an empty map");
                return Self::new(Vec::new(), active);
            }
        };
        match serde_json::from_str::<Vec<NameMapRule>>(&text) {
            Ok(rules) => Self::new(rules, active),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "name-map file unparseable; using an empty map");
                Self::new(Vec::new(), active)
            }
        }
    }

    /// Whether compact mode is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Short form of a long field name.
    ///
    /// Identity when compact mode is off, for indicator fields, and for
    /// names that are already short. Unknown long names warn and pass
    /// through.
    pub fn field_name(&self, name: &str) -> String {
        if !self.active || name.starts_with(INDICATOR_PREFIX) {
            return name.to_string();
        }
        if let Some(short) = self.long_to_short.get(name) {
            return short.clone();
        }
        if !self.short_to_long.contains_key(name) {
            warn!(field = name, "no short name mapping; passing through");
        }
        name.to_string()
    }

    /// Long form of a short field name; identity fallback.
    pub fn original(&self, short: &str) -> String {
        self.short_to_long
            .get(short)
            .cloned()
            .unwrap_or_else(|| short.to_string())
    }

    /// Rewrite the first path segment after the `d.` root:
    /// `"d.foo.bar"` → `"d.short.bar"`. Non-`d.` paths pass through.
    pub fn transform_path(&self, path: &str) -> String {
        let Some(rest) = path.strip_prefix("d.") else {
            return path.to_string();
        };
        match rest.split_once('.') {
            Some((first, suffix)) => format!("d.{}.{suffix}", self.field_name(first)),
            None => format!("d.{}", self.field_name(rest)),
        }
    }

    /// Rewrite a `$d.`-prefixed operand reference. Arrays are rewritten
    /// element-wise; non-string and non-`$d.` values pass through.
    pub fn transform_mongo_path(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => match self.rewrite_ref(s) {
                Some(rewritten) => Value::String(rewritten),
                None => value.clone(),
            },
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.transform_mongo_path(v)).collect())
            }
            other => other.clone(),
        }
    }

    /// Rewrite a `$$d.`-prefixed runtime variable reference.
    pub fn transform_variable_path(&self, value: &Value) -> Value {
        self.transform_mongo_path(value)
    }

    /// Recursively rewrite a query tree.
    ///
    /// Keys rooted at `d.` have their first segment rewritten and their
    /// value recursed; operator keys are preserved with recursed values;
    /// `$expr` delegates to [`Self::transform_expr`]; other keys pass
    /// through structurally.
    pub fn transform_condition(&self, tree: &Value) -> Value {
        if !self.active {
            return tree.clone();
        }
        match tree {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, sub) in map {
                    if key == "$expr" {
                        out.insert(key.clone(), self.transform_expr(sub));
                    } else if key.starts_with("d.") {
                        out.insert(self.transform_path(key), self.transform_condition(sub));
                    } else {
                        out.insert(key.clone(), self.transform_condition(sub));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.transform_condition(v)).collect())
            }
            Value::String(_) => self.transform_mongo_path(tree),
            other => other.clone(),
        }
    }

    /// Rewrite an `$expr` expression tree operand-wise.
    pub fn transform_expr(&self, expr: &Value) -> Value {
        if !self.active {
            return expr.clone();
        }
        match expr {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (op, operands) in map {
                    let rewritten = match operands {
                        Value::Array(items) => Value::Array(
                            items.iter().map(|item| self.transform_operand(item)).collect(),
                        ),
                        other => self.transform_operand(other),
                    };
                    out.insert(op.clone(), rewritten);
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    /// Rewrite one expression operand: `$d.`/`$$d.` strings are path
    /// references, objects are descended as conditions (which handles
    /// nested `$dateAdd`, `$and`, `$or`), everything else passes through.
    fn transform_operand(&self, operand: &Value) -> Value {
        match operand {
            Value::String(_) => self.transform_mongo_path(operand),
            Value::Object(_) => self.transform_condition(operand),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.transform_operand(v)).collect())
            }
            other => other.clone(),
        }
    }

    /// Rewrite aggregation operand paths inside attribute expressions.
    /// Both `$d.` and `$$d.` forms are recognised.
    pub fn transform_attributes(&self, attrs: &Map<String, Value>) -> Map<String, Value> {
        if !self.active {
            return attrs.clone();
        }
        attrs
            .iter()
            .map(|(key, expr)| {
                let rewritten = match expr {
                    Value::String(_) => self.transform_mongo_path(expr),
                    Value::Object(_) => self.transform_expr(expr),
                    other => other.clone(),
                };
                (key.clone(), rewritten)
            })
            .collect()
    }

    /// Long names referenced by a tree for which no short mapping exists.
    ///
    /// Returns a sorted, deduplicated list; compact-mode activation treats
    /// a non-empty result as fatal.
    pub fn unmapped_fields(&self, tree: &Value) -> Vec<String> {
        let mut missing = Vec::new();
        self.collect_unmapped(tree, &mut missing);
        missing.sort();
        missing.dedup();
        missing
    }

    fn collect_unmapped(&self, tree: &Value, missing: &mut Vec<String>) {
        match tree {
            Value::Object(map) => {
                for (key, sub) in map {
                    if let Some(rest) = key.strip_prefix("d.") {
                        self.note_unmapped(rest.split('.').next().unwrap_or(rest), missing);
                    }
                    self.collect_unmapped(sub, missing);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_unmapped(item, missing);
                }
            }
            Value::String(s) => {
                let rest = s
                    .strip_prefix("$$d.")
                    .or_else(|| s.strip_prefix("$d."));
                if let Some(rest) = rest {
                    self.note_unmapped(rest.split('.').next().unwrap_or(rest), missing);
                }
            }
            _ => {}
        }
    }

    fn note_unmapped(&self, name: &str, missing: &mut Vec<String>) {
        if name.starts_with(INDICATOR_PREFIX)
            || self.long_to_short.contains_key(name)
            || self.short_to_long.contains_key(name)
        {
            return;
        }
        missing.push(name.to_string());
    }

    /// Rewrite the first payload segment of a `$d.`/`$$d.` reference.
    fn rewrite_ref(&self, s: &str) -> Option<String> {
        for prefix in ["$$d.", "$d."] {
            if let Some(rest) = s.strip_prefix(prefix) {
                let rewritten = match rest.split_once('.') {
                    Some((first, suffix)) => {
                        format!("{prefix}{}.{suffix}", self.field_name(first))
                    }
                    None => format!("{prefix}{}", self.field_name(rest)),
                };
                return Some(rewritten);
            }
        }
        None
    }
}
