//! Catalogue-file loading and interval splitting through the producer.

use std::fs;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use tally_core::{EngineConfig, Fact};
use tally_engine::{CounterProducer, FieldNameMap};

#[test]
fn loads_catalogue_from_absolute_path() {
    let path = std::env::temp_dir().join(format!("tally-catalogue-{}.json", Uuid::new_v4()));
    fs::write(
        &path,
        serde_json::to_string_pretty(&json!([
            {
                "name": "approved",
                "indexTypeName": "card",
                "comment": "approved transactions per card",
                "computationConditions": {"t": [50], "status": {"$ne": "R"}},
                "evaluationConditions": {"t": [50]},
                "attributes": {"cnt": {"$sum": 1}, "total": {"$sum": "$d.amount"}}
            },
            {
                "name": "daily-volume",
                "indexTypeName": "card",
                "computationConditions": {"t": [50]},
                "evaluationConditions": {},
                "attributes": {"total": {"$sum": "$d.amount"}},
                "toTimeMs": 0,
                "fromTimeMs": 86_400_000
            }
        ]))
        .unwrap(),
    )
    .unwrap();

    let p = CounterProducer::from_file(
        &path,
        EngineConfig::default(),
        Arc::new(FieldNameMap::disabled()),
    )
    .unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(p.len(), 2);
    let f = Fact::new(
        50,
        json!({"status": "A", "amount": 120}).as_object().cloned().unwrap(),
    );
    let result = p.fact_counters(&f, None).unwrap();
    let names: Vec<&str> = result.contributing.iter().map(|c| c.name.as_str()).collect();
    // Zero-window counter first, then the day-window one.
    assert_eq!(names, vec!["approved", "daily-volume"]);
}

#[test]
fn malformed_catalogue_entry_names_the_offender() {
    let path = std::env::temp_dir().join(format!("tally-catalogue-{}.json", Uuid::new_v4()));
    fs::write(
        &path,
        r#"[{"name": "broken", "computationConditions": {}}]"#,
    )
    .unwrap();

    let err = CounterProducer::from_file(
        &path,
        EngineConfig::default(),
        Arc::new(FieldNameMap::disabled()),
    )
    .unwrap_err();
    fs::remove_file(&path).ok();

    assert!(err.to_string().contains("broken"));
    assert!(err.to_string().contains("evaluationConditions"));
}

#[test]
fn split_catalogue_exposes_suffixed_names() {
    let catalogue = vec![json!({
        "name": "day",
        "indexTypeName": "card",
        "computationConditions": {"t": [50]},
        "evaluationConditions": {},
        "attributes": {"cnt": {"$sum": 1}},
        "toTimeMs": 0,
        "fromTimeMs": 86_400_000
    })];

    let p = CounterProducer::from_values(
        &catalogue,
        EngineConfig::default().with_split_intervals(vec![3_600_000, 21_600_000]),
        Arc::new(FieldNameMap::disabled()),
    )
    .unwrap();

    let f = Fact::new(50, json!({"x": 1}).as_object().cloned().unwrap());
    let result = p.fact_counters(&f, None).unwrap();
    let names: Vec<&str> = result.contributing.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["day#0", "day#1", "day#2"]);

    let windows: Vec<(i64, i64)> = result.contributing.iter().map(|c| c.window()).collect();
    assert_eq!(
        windows,
        vec![
            (0, 3_600_000),
            (3_600_000, 21_600_000),
            (21_600_000, 86_400_000)
        ]
    );
}
