//! Counter catalogue entries.
//!
//! A counter is a parametric aggregation definition with two predicates:
//! *computation* conditions decide whether a fact contributes to the
//! counter, *evaluation* conditions decide whether a fact forces the
//! counter to be recomputed. Both predicates use the MongoDB-style query
//! language interpreted by `tally-engine`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A single counter definition, as authored in the catalogue file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterDef {
    /// Unique identifier; used as metric/result key.
    pub name: String,

    /// Symbolic name of the fact-index family this counter filters on.
    #[serde(rename = "indexTypeName", default)]
    pub index_type_name: String,

    /// Predicate deciding whether a fact contributes to the counter.
    #[serde(rename = "computationConditions", default)]
    pub computation_conditions: Value,

    /// Predicate deciding whether a fact recomputes the counter.
    /// Must be defined; an empty object matches every fact.
    #[serde(rename = "evaluationConditions")]
    pub evaluation_conditions: Option<Value>,

    /// Mapping from output-field name to an aggregation expression
    /// (`$sum`, `$avg`, `$max`, `$addToSet`, `$sum: 1`). Counters without
    /// attributes never contribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,

    /// Free-form author note; ignored by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Start of the relative time window, in milliseconds before "now".
    #[serde(rename = "fromTimeMs", default, skip_serializing_if = "Option::is_none")]
    pub from_time_ms: Option<i64>,

    /// End of the relative time window, in milliseconds before "now".
    #[serde(rename = "toTimeMs", default, skip_serializing_if = "Option::is_none")]
    pub to_time_ms: Option<i64>,
}

impl CounterDef {
    /// Parse and validate a raw catalogue entry.
    ///
    /// Rejection reasons are precise so a misauthored catalogue names the
    /// offending entry and field instead of a generic parse failure.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Catalogue("counter entry is not an object".to_string()))?;

        let name = match obj.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            Some(_) => {
                return Err(Error::Catalogue(
                    "counter 'name' must be a non-empty string".to_string(),
                ))
            }
            None => return Err(Error::Catalogue("counter entry has no 'name'".to_string())),
        };

        match obj.get("computationConditions") {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(Error::Catalogue(format!(
                    "counter '{name}': computationConditions must be an object"
                )))
            }
            None => {
                return Err(Error::Catalogue(format!(
                    "counter '{name}': computationConditions missing"
                )))
            }
        }

        match obj.get("evaluationConditions") {
            Some(Value::Object(_)) | Some(Value::Null) => {}
            Some(_) => {
                return Err(Error::Catalogue(format!(
                    "counter '{name}': evaluationConditions must be an object"
                )))
            }
            None => {
                return Err(Error::Catalogue(format!(
                    "counter '{name}': evaluationConditions missing"
                )))
            }
        }

        let def: CounterDef = serde_json::from_value(value.clone())
            .map_err(|e| Error::Catalogue(format!("counter '{name}': {e}")))?;
        def.validate()?;
        Ok(def)
    }

    /// Validate the relative time window.
    ///
    /// Negative bounds are rejected. A degenerate window (`from ≤ to`) is
    /// tolerated here; interval splitting passes it through unchanged.
    pub fn validate(&self) -> Result<()> {
        for (label, bound) in [("fromTimeMs", self.from_time_ms), ("toTimeMs", self.to_time_ms)] {
            if let Some(ms) = bound {
                if ms < 0 {
                    return Err(Error::Catalogue(format!(
                        "counter '{}': {label} is negative",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// The counter's time window as `(to, from)` milliseconds, with the
    /// missing end defaulting to zero.
    pub fn window(&self) -> (i64, i64) {
        (self.to_time_ms.unwrap_or(0), self.from_time_ms.unwrap_or(0))
    }
}
