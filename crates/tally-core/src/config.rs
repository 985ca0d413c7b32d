//! Engine configuration knobs.
//!
//! The knob names are an external contract shared with deployment tooling:
//!
//! - `USE_SHORT_NAMES`: enables compact mode (on-the-wire facts use short
//!   field names mapped from the long authored names).
//! - `DEBUG_MODE`: enables per-mismatch debug logging in the producer.
//! - `UNDEFINED_FIELD_IS_TRUE`: changes missing-field semantics for the
//!   affected-counters pass only.
//! - `SPLIT_INTERVALS`: comma-separated ascending millisecond boundaries
//!   used to split counter time windows into sub-counters.
//! - `MESSAGE_TYPE_FIELD`: field carrying the message-type discriminator
//!   (default `t`).
//!
//! Booleans are parsed as "true", "1", "yes", "on" (case-insensitive) and
//! their negations. `.env` files are honoured via dotenvy.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Default message-type discriminator field.
pub const DEFAULT_MESSAGE_TYPE_FIELD: &str = "t";

/// Runtime configuration for the counter producer and evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compact mode: rewrite authored long field names to short wire names.
    pub use_short_names: bool,

    /// Log a debug line for every counter that fails to match a fact.
    pub debug_mode: bool,

    /// Affected-counters pass treats missing fields as matching, so the
    /// affected count over-approximates.
    pub undefined_field_is_true: bool,

    /// Ascending millisecond boundaries splitting counter time windows.
    pub split_intervals: Option<Vec<i64>>,

    /// Field name resolving to the fact's integer type discriminator.
    pub message_type_field: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_short_names: false,
            debug_mode: false,
            undefined_field_is_true: false,
            split_intervals: None,
            message_type_field: DEFAULT_MESSAGE_TYPE_FIELD.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with all knobs at their defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct the configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    /// Returns a configuration error when `SPLIT_INTERVALS` is present but
    /// not an ascending list of non-negative integers.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            use_short_names: parse_bool_env("USE_SHORT_NAMES", false),
            debug_mode: parse_bool_env("DEBUG_MODE", false),
            undefined_field_is_true: parse_bool_env("UNDEFINED_FIELD_IS_TRUE", false),
            split_intervals: parse_split_intervals(env::var("SPLIT_INTERVALS").ok())?,
            message_type_field: env::var("MESSAGE_TYPE_FIELD")
                .unwrap_or_else(|_| DEFAULT_MESSAGE_TYPE_FIELD.to_string()),
        })
    }

    /// Builder-style override for compact mode.
    pub fn with_short_names(mut self, on: bool) -> Self {
        self.use_short_names = on;
        self
    }

    /// Builder-style override for the affected-pass missing-field policy.
    pub fn with_undefined_field_is_true(mut self, on: bool) -> Self {
        self.undefined_field_is_true = on;
        self
    }

    /// Builder-style override for the split boundaries.
    pub fn with_split_intervals(mut self, boundaries: Vec<i64>) -> Self {
        self.split_intervals = Some(boundaries);
        self
    }
}

/// Parses a boolean environment variable with a default fallback.
///
/// Recognizes "true", "1", "yes", "on" (case-insensitive) as true.
/// Any other value or missing variable returns the default.
fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|val| {
            let val_lower = val.to_lowercase();
            match val_lower.as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            }
        })
        .unwrap_or(default)
}

/// Parses `SPLIT_INTERVALS` into an ascending boundary list.
fn parse_split_intervals(raw: Option<String>) -> Result<Option<Vec<i64>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let mut boundaries = Vec::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        let value: i64 = part.parse().map_err(|_| {
            Error::Config(format!("SPLIT_INTERVALS entry '{part}' is not an integer"))
        })?;
        if value < 0 {
            return Err(Error::Config(format!(
                "SPLIT_INTERVALS entry '{part}' is negative"
            )));
        }
        boundaries.push(value);
    }

    if boundaries.windows(2).any(|w| w[0] >= w[1]) {
        warn!(
            raw = trimmed,
            "SPLIT_INTERVALS not strictly ascending; sorting and deduplicating"
        );
        boundaries.sort_unstable();
        boundaries.dedup();
    }

    Ok(Some(boundaries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables.
    // Environment variables are process-global, so tests must not run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        env::remove_var("USE_SHORT_NAMES");
        env::remove_var("DEBUG_MODE");
        env::remove_var("UNDEFINED_FIELD_IS_TRUE");
        env::remove_var("SPLIT_INTERVALS");
        env::remove_var("MESSAGE_TYPE_FIELD");
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.use_short_names);
        assert!(!config.debug_mode);
        assert!(!config.undefined_field_is_true);
        assert!(config.split_intervals.is_none());
        assert_eq!(config.message_type_field, "t");
    }

    #[test]
    fn test_from_env_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_from_env_booleans() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("USE_SHORT_NAMES", "yes");
        env::set_var("DEBUG_MODE", "1");
        env::set_var("UNDEFINED_FIELD_IS_TRUE", "TRUE");

        let config = EngineConfig::from_env().unwrap();
        assert!(config.use_short_names);
        assert!(config.debug_mode);
        assert!(config.undefined_field_is_true);

        clear_env();
    }

    #[test]
    fn test_from_env_split_intervals() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("SPLIT_INTERVALS", "3600000, 21600000,86400000");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(
            config.split_intervals,
            Some(vec![3_600_000, 21_600_000, 86_400_000])
        );

        clear_env();
    }

    #[test]
    fn test_from_env_split_intervals_unordered_is_sorted() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("SPLIT_INTERVALS", "21600000,3600000,3600000");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.split_intervals, Some(vec![3_600_000, 21_600_000]));

        clear_env();
    }

    #[test]
    fn test_from_env_split_intervals_rejects_garbage() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("SPLIT_INTERVALS", "36h,1d");
        let err = EngineConfig::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        clear_env();
    }

    #[test]
    fn test_from_env_split_intervals_rejects_negative() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("SPLIT_INTERVALS", "-5,10");
        assert!(EngineConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    fn test_from_env_message_type_field() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("MESSAGE_TYPE_FIELD", "messageType");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.message_type_field, "messageType");

        clear_env();
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::new()
            .with_short_names(true)
            .with_undefined_field_is_true(true)
            .with_split_intervals(vec![1000, 2000]);

        assert!(config.use_short_names);
        assert!(config.undefined_field_is_true);
        assert_eq!(config.split_intervals, Some(vec![1000, 2000]));
    }
}
