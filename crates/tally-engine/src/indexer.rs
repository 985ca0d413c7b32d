//! Fact indexer: derives hashed composite index entries for a fact.
//!
//! For each schema rule whose field the fact carries, the indexer emits an
//! entry keyed by the MD5 digest of the canonical composite
//! `(indexType, indexValue, fieldName, payload value)`. Digests are
//! computed over the authored long field name and the canonical JSON of
//! the value, so they are deterministic across processes, languages, and
//! compact-mode settings.

use std::sync::Arc;

use tracing::debug;

use tally_core::{Fact, FactIndexEntry, IndexSchemaRule};

use crate::eval::compare;
use crate::name_map::FieldNameMap;

/// The frozen index schema plus the injected field-name mapper.
pub struct FactIndexer {
    schema: Vec<IndexSchemaRule>,
    name_map: Arc<FieldNameMap>,
}

impl FactIndexer {
    pub fn new(schema: Vec<IndexSchemaRule>, name_map: Arc<FieldNameMap>) -> Self {
        Self { schema, name_map }
    }

    /// Number of schema rules.
    pub fn len(&self) -> usize {
        self.schema.len()
    }

    /// Whether the schema is empty.
    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    /// Derive the index entries for one fact.
    ///
    /// Rules whose field is absent from the payload produce no entry. The
    /// window-anchor timestamp is read from the rule's date field; a
    /// missing or unparseable anchor falls back to the fact's `createdAt`.
    pub fn entries(&self, fact: &Fact) -> Vec<FactIndexEntry> {
        let mut out = Vec::new();
        for rule in &self.schema {
            // Payload lookup goes through the wire (short) name; the digest
            // stays keyed by the authored name.
            let wire_field = self.name_map.field_name(&rule.field_name);
            let Some(value) = fact.payload_at(&wire_field) else {
                continue;
            };
            let Ok(canonical) = serde_json::to_string(value) else {
                continue;
            };

            let anchor_at = fact
                .payload_at(&self.name_map.field_name(&rule.date_name))
                .and_then(compare::date_of)
                .unwrap_or_else(|| {
                    debug!(
                        fact_id = %fact.id,
                        field = %rule.date_name,
                        "missing or invalid date anchor; using createdAt"
                    );
                    fact.created_at
                });

            let digest = md5::compute(format!(
                "{}|{}|{}|{canonical}",
                rule.index_type, rule.index_value, rule.field_name
            ));

            out.push(FactIndexEntry {
                hash: format!("{digest:x}"),
                fact_id: fact.id.clone(),
                fact_type: fact.fact_type,
                anchor_at,
                index_type_name: rule.index_type_name.clone(),
                index_type: rule.index_type,
                index_value: rule.index_value,
            });
        }

        debug!(fact_id = %fact.id, entry_count = out.len(), "fact indexed");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn rule(field: &str, date: &str, family: &str, ty: i64, value: i64) -> IndexSchemaRule {
        IndexSchemaRule {
            field_name: field.to_string(),
            date_name: date.to_string(),
            index_type_name: family.to_string(),
            index_type: ty,
            index_value: value,
        }
    }

    fn fact(payload: Value) -> Fact {
        Fact::new(50, payload.as_object().cloned().unwrap())
    }

    fn indexer(schema: Vec<IndexSchemaRule>) -> FactIndexer {
        FactIndexer::new(schema, Arc::new(FieldNameMap::disabled()))
    }

    #[test]
    fn test_entries_carry_schema_identifiers() {
        let ix = indexer(vec![rule("pan", "dt", "card", 1, 3)]);
        let f = fact(json!({"pan": "4111", "dt": "2026-08-01T10:00:00Z"}));
        let entries = ix.entries(&f);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.fact_id, f.id);
        assert_eq!(entry.fact_type, 50);
        assert_eq!(entry.index_type_name, "card");
        assert_eq!(entry.index_type, 1);
        assert_eq!(entry.index_value, 3);
        assert_eq!(entry.anchor_at.to_rfc3339(), "2026-08-01T10:00:00+00:00");
    }

    #[test]
    fn test_hash_is_fixed_width_hex() {
        let ix = indexer(vec![rule("pan", "dt", "card", 1, 3)]);
        let entries = ix.entries(&fact(json!({"pan": "4111"})));
        let hash = &entries[0].hash;
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_is_deterministic_and_value_sensitive() {
        let ix = indexer(vec![rule("pan", "dt", "card", 1, 3)]);
        let a = ix.entries(&fact(json!({"pan": "4111"})));
        let b = ix.entries(&fact(json!({"pan": "4111"})));
        let c = ix.entries(&fact(json!({"pan": "4222"})));
        assert_eq!(a[0].hash, b[0].hash);
        assert_ne!(a[0].hash, c[0].hash);

        // Same value under a different schema slot hashes differently.
        let other_slot = indexer(vec![rule("pan", "dt", "card", 1, 4)]);
        let d = other_slot.entries(&fact(json!({"pan": "4111"})));
        assert_ne!(a[0].hash, d[0].hash);
    }

    #[test]
    fn test_absent_field_produces_no_entry() {
        let ix = indexer(vec![
            rule("pan", "dt", "card", 1, 3),
            rule("merchant", "dt", "merchant", 2, 1),
        ]);
        let entries = ix.entries(&fact(json!({"merchant": "ACME"})));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index_type_name, "merchant");
    }

    #[test]
    fn test_missing_date_anchor_falls_back_to_created_at() {
        let ix = indexer(vec![rule("pan", "dt", "card", 1, 3)]);
        let f = fact(json!({"pan": "4111", "dt": "not a date"}));
        let entries = ix.entries(&f);
        assert_eq!(entries[0].anchor_at, f.created_at);
    }

    #[test]
    fn test_epoch_millis_anchor() {
        let ix = indexer(vec![rule("pan", "dt", "card", 1, 3)]);
        let f = fact(json!({"pan": "4111", "dt": 1_785_578_400_000i64}));
        let entries = ix.entries(&f);
        assert_eq!(entries[0].anchor_at.timestamp_millis(), 1_785_578_400_000);
    }

    #[test]
    fn test_compact_mode_lookup_keeps_authored_hash() {
        let active_map = Arc::new(FieldNameMap::new(
            vec![
                crate::name_map::NameMapRule {
                    dst: Some("cardNumber".to_string()),
                    short_dst: Some("pan".to_string()),
                },
                crate::name_map::NameMapRule {
                    dst: Some("transactionDate".to_string()),
                    short_dst: Some("dt".to_string()),
                },
            ],
            true,
        ));
        let compact = FactIndexer::new(
            vec![rule("cardNumber", "transactionDate", "card", 1, 3)],
            active_map,
        );
        // Wire fact uses short names.
        let f = fact(json!({"pan": "4111", "dt": "2026-08-01T10:00:00Z"}));
        let compact_entries = compact.entries(&f);
        assert_eq!(compact_entries.len(), 1);

        // A long-named deployment of the same schema produces the same hash
        // for the same value.
        let plain = FactIndexer::new(
            vec![rule("cardNumber", "transactionDate", "card", 1, 3)],
            Arc::new(FieldNameMap::disabled()),
        );
        let long_fact = fact(json!({"cardNumber": "4111", "transactionDate": "2026-08-01T10:00:00Z"}));
        let plain_entries = plain.entries(&long_fact);
        assert_eq!(compact_entries[0].hash, plain_entries[0].hash);
    }
}
