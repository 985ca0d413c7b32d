//! Time-interval splitting of counter windows.
//!
//! When a boundary list is configured, each counter with a real time
//! window is expanded into a series of sub-counters whose windows
//! partition the original: the union of the sub-windows equals the
//! original window and the sub-windows are pairwise disjoint and ordered.

use tally_core::CounterDef;

/// Split one counter along the configured boundaries.
///
/// Only boundaries strictly inside `(toTimeMs, fromTimeMs)` split. When
/// splitting produces more than one sub-counter, names are suffixed `#0`,
/// `#1`, …; otherwise the counter passes through unchanged. Pathological
/// windows (`from ≤ to`) and counters without a window pass through
/// unchanged.
pub fn split_counter(def: CounterDef, boundaries: &[i64]) -> Vec<CounterDef> {
    let (to, from) = def.window();
    if def.from_time_ms.is_none() || from <= to {
        return vec![def];
    }

    let inner: Vec<i64> = boundaries
        .iter()
        .copied()
        .filter(|b| *b > to && *b < from)
        .collect();
    if inner.is_empty() {
        return vec![def];
    }

    let mut edges = Vec::with_capacity(inner.len() + 2);
    edges.push(to);
    edges.extend(inner);
    edges.push(from);

    edges
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let mut sub = def.clone();
            sub.name = format!("{}#{i}", def.name);
            sub.to_time_ms = Some(pair[0]);
            sub.from_time_ms = Some(pair[1]);
            sub
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter(name: &str, to: Option<i64>, from: Option<i64>) -> CounterDef {
        CounterDef {
            name: name.to_string(),
            index_type_name: "card".to_string(),
            computation_conditions: json!({}),
            evaluation_conditions: Some(json!({})),
            attributes: None,
            comment: None,
            from_time_ms: from,
            to_time_ms: to,
        }
    }

    #[test]
    fn test_split_partitions_window() {
        let subs = split_counter(
            counter("day", Some(0), Some(86_400_000)),
            &[3_600_000, 21_600_000],
        );
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].name, "day#0");
        assert_eq!(subs[1].name, "day#1");
        assert_eq!(subs[2].name, "day#2");
        assert_eq!(subs[0].window(), (0, 3_600_000));
        assert_eq!(subs[1].window(), (3_600_000, 21_600_000));
        assert_eq!(subs[2].window(), (21_600_000, 86_400_000));

        // Partition: contiguous, ordered, covering [to, from].
        for pair in subs.windows(2) {
            assert_eq!(pair[0].from_time_ms, pair[1].to_time_ms);
        }
        assert_eq!(subs.first().unwrap().to_time_ms, Some(0));
        assert_eq!(subs.last().unwrap().from_time_ms, Some(86_400_000));
    }

    #[test]
    fn test_boundaries_outside_window_ignored() {
        let subs = split_counter(
            counter("hour", Some(0), Some(3_600_000)),
            &[3_600_000, 21_600_000],
        );
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "hour");
    }

    #[test]
    fn test_boundary_on_edge_does_not_split() {
        // Boundaries equal to either edge are not strictly inside.
        let subs = split_counter(counter("w", Some(1000), Some(2000)), &[1000, 2000]);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "w");
    }

    #[test]
    fn test_missing_from_passes_through() {
        let subs = split_counter(counter("nowin", None, None), &[500]);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "nowin");
    }

    #[test]
    fn test_pathological_window_passes_through() {
        let subs = split_counter(counter("bad", Some(5000), Some(1000)), &[2000]);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "bad");
        assert_eq!(subs[0].window(), (5000, 1000));
    }

    #[test]
    fn test_single_inner_boundary() {
        let subs = split_counter(counter("w", Some(0), Some(10_000)), &[4_000]);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].window(), (0, 4_000));
        assert_eq!(subs[1].window(), (4_000, 10_000));
    }

    #[test]
    fn test_implicit_zero_to() {
        let subs = split_counter(counter("w", None, Some(10_000)), &[4_000]);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].window(), (0, 4_000));
    }
}
