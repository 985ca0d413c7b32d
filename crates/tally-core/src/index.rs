//! Fact-index schema and entry models.
//!
//! A fact-index entry is a hashed composite key derived from a fact and an
//! index schema rule. The storage layer persists entries and answers
//! relevance lookups by hash-set intersection, so finding the historical
//! facts a counter aggregates over costs O(index-hits) rather than
//! O(all-facts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One rule of an index schema.
///
/// A rule applies to a fact when the payload carries `fieldName`; the
/// resulting entry is keyed by the hash of the composite
/// `(indexType, indexValue, fieldName, payload[fieldName])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchemaRule {
    /// Payload field whose value participates in the composite key.
    #[serde(rename = "fieldName")]
    pub field_name: String,

    /// Payload field carrying the window-anchor timestamp.
    #[serde(rename = "dateName")]
    pub date_name: String,

    /// Symbolic name of the index family; referenced by counters via
    /// `indexTypeName`.
    #[serde(rename = "indexTypeName")]
    pub index_type_name: String,

    /// Numeric index class.
    #[serde(rename = "indexType")]
    pub index_type: i64,

    /// Numeric index discriminator within the class.
    #[serde(rename = "indexValue")]
    pub index_value: i64,
}

/// A derived index entry, persisted by the external storage layer.
///
/// `hash` is a fixed-width lowercase hex digest so storage sees
/// uniform-width lookup keys; it is stable across processes and languages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactIndexEntry {
    /// Composite-key digest (lowercase hex MD5).
    #[serde(rename = "h")]
    pub hash: String,

    /// Id of the fact the entry was derived from.
    #[serde(rename = "factId")]
    pub fact_id: String,

    /// Type discriminator of the fact.
    #[serde(rename = "factType")]
    pub fact_type: i64,

    /// Window-anchor timestamp read from the rule's `dateName` field.
    #[serde(rename = "anchorAt")]
    pub anchor_at: DateTime<Utc>,

    /// Schema identifiers carried through for storage-side grouping.
    #[serde(rename = "indexTypeName")]
    pub index_type_name: String,

    #[serde(rename = "indexType")]
    pub index_type: i64,

    #[serde(rename = "indexValue")]
    pub index_value: i64,
}
