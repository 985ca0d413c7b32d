//! The immutable fact model.
//!
//! A fact is a structured document describing a business event (for example
//! a card transaction). The engine consumes facts read-only; once built, a
//! fact never changes.
//!
//! Payload values are reached via dotted paths rooted at `d.`; the wire
//! representation nests the payload under the `d` key so that compact field
//! names stay out of the envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// An immutable structured event.
///
/// Wire format:
///
/// ```json
/// { "id": "…", "type": 50, "createdAt": "2026-08-01T12:00:00Z", "d": { … } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Opaque identifier assigned by the producer.
    pub id: String,

    /// Integer type discriminator.
    #[serde(rename = "type")]
    pub fact_type: i64,

    /// Creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Nested payload, reached via dotted paths rooted at `d.`.
    #[serde(rename = "d", default)]
    pub payload: Map<String, Value>,
}

impl Fact {
    /// Create a fact with a fresh UUIDv7 id and the current wall time.
    pub fn new(fact_type: i64, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            fact_type,
            created_at: Utc::now(),
            payload,
        }
    }

    /// Create a fact with an explicit id and timestamp.
    pub fn with_id(
        id: impl Into<String>,
        fact_type: i64,
        created_at: DateTime<Utc>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            fact_type,
            created_at,
            payload,
        }
    }

    /// A payload-less probe fact carrying only a type discriminator.
    ///
    /// Used by the type-keyed candidate caches to test whether a counter's
    /// conditions constrain the message type.
    pub fn stub(fact_type: i64) -> Self {
        Self {
            id: String::new(),
            fact_type,
            created_at: Utc::now(),
            payload: Map::new(),
        }
    }

    /// Resolve a dotted payload path.
    ///
    /// The leading `d.` root is optional: `"d.foo.bar"` and `"foo.bar"`
    /// address the same value. Numeric segments index into arrays. Missing
    /// segments resolve to `None` (undefined), which the evaluator keeps
    /// distinct from an explicit `null`.
    pub fn payload_at(&self, path: &str) -> Option<&Value> {
        let path = path.strip_prefix("d.").unwrap_or(path);
        let mut segments = path.split('.');
        let mut current = self.payload.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object payload")
    }

    #[test]
    fn test_wire_names() {
        let fact = Fact::with_id(
            "f-1",
            50,
            "2026-08-01T12:00:00Z".parse().unwrap(),
            payload(json!({"status": "A"})),
        );
        let wire = serde_json::to_value(&fact).unwrap();
        assert_eq!(wire["id"], "f-1");
        assert_eq!(wire["type"], 50);
        assert_eq!(wire["createdAt"], "2026-08-01T12:00:00Z");
        assert_eq!(wire["d"]["status"], "A");
    }

    #[test]
    fn test_roundtrip() {
        let fact = Fact::new(70, payload(json!({"amount": 12.5})));
        let text = serde_json::to_string(&fact).unwrap();
        let back: Fact = serde_json::from_str(&text).unwrap();
        assert_eq!(back, fact);
    }

    #[test]
    fn test_missing_payload_defaults_empty() {
        let fact: Fact =
            serde_json::from_value(json!({"id": "x", "type": 1, "createdAt": "2026-08-01T00:00:00Z"}))
                .unwrap();
        assert!(fact.payload.is_empty());
    }

    #[test]
    fn test_payload_at_nested() {
        let fact = Fact::new(
            1,
            payload(json!({"merchant": {"name": "ACME", "codes": [10, 20]}})),
        );
        assert_eq!(
            fact.payload_at("d.merchant.name"),
            Some(&json!("ACME"))
        );
        assert_eq!(fact.payload_at("merchant.codes.1"), Some(&json!(20)));
        assert_eq!(fact.payload_at("d.merchant.city"), None);
        assert_eq!(fact.payload_at("d.merchant.codes.9"), None);
    }

    #[test]
    fn test_payload_at_scalar_dead_end() {
        let fact = Fact::new(1, payload(json!({"status": "A"})));
        assert_eq!(fact.payload_at("d.status.inner"), None);
    }

    #[test]
    fn test_stub_is_payload_less() {
        let stub = Fact::stub(50);
        assert_eq!(stub.fact_type, 50);
        assert!(stub.payload.is_empty());
        assert_eq!(stub.payload_at("d.anything"), None);
    }

    #[test]
    fn test_new_assigns_distinct_ids() {
        let a = Fact::new(1, Map::new());
        let b = Fact::new(1, Map::new());
        assert_ne!(a.id, b.id);
    }
}
