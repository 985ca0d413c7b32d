//! Structured logging schema and field name constants for tally.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (catalogue load, freeze), operation completions |
//! | DEBUG | Decision points, per-mismatch notes, cache fills |
//! | TRACE | Per-operator evaluation, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "engine", "producer", "indexer", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "fact_counters", "make", "load_catalogue", "index_entries"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Opaque id of the fact being evaluated.
pub const FACT_ID: &str = "fact_id";

/// Integer type discriminator of the fact.
pub const FACT_TYPE: &str = "fact_type";

/// Name of the counter definition involved.
pub const COUNTER_NAME: &str = "counter";

/// Symbolic fact-index family name.
pub const INDEX_TYPE_NAME: &str = "index_type_name";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of counters the fact contributes to.
pub const CONTRIBUTING_COUNT: &str = "contributing";

/// Number of counters whose recomputation the fact triggers.
pub const AFFECTED_COUNT: &str = "affected";

/// Number of type-keyed candidates considered.
pub const CANDIDATE_COUNT: &str = "candidates";

/// Number of index entries derived from a fact.
pub const ENTRY_COUNT: &str = "entry_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Initialise a `tracing` subscriber for hosts and integration tests.
///
/// Honors `RUST_LOG`; defaults to debug-level output for the tally crates.
/// Safe to call more than once: later calls are no-ops.
pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tally_core=debug,tally_engine=debug,tally_store=debug".into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn test_field_names_are_snake_case() {
        for name in [
            SUBSYSTEM,
            OPERATION,
            FACT_ID,
            FACT_TYPE,
            COUNTER_NAME,
            INDEX_TYPE_NAME,
            DURATION_MS,
            CONTRIBUTING_COUNT,
            AFFECTED_COUNT,
            CANDIDATE_COUNT,
            ENTRY_COUNT,
            ERROR_MSG,
        ] {
            assert!(name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_' || c.is_ascii_digit()));
        }
    }
}
