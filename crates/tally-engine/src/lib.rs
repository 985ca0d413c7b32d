//! # tally-engine
//!
//! The per-fact evaluation pipeline of the tally relevance engine.
//!
//! For every incoming [`Fact`](tally_core::Fact) the engine determines
//! which of the configured counters the fact contributes to and which it
//! forces to recompute:
//!
//! 1. [`name_map`]: bidirectional field-name rewriting so on-the-wire
//!    facts may use compact keys without altering authored queries;
//! 2. [`eval`]: a pure, fact-local interpreter of a MongoDB-style query
//!    language;
//! 3. [`producer`]: catalogue validation, interval splitting, type-keyed
//!    candidate caching, and the two-pass match per fact;
//! 4. [`indexer`]: hashed composite index entries for O(index-hits)
//!    relevance lookups downstream.
//!
//! The pipeline is synchronous and pure: no I/O, no mutation of facts, and
//! deterministic results given identical inputs and "now".

pub mod eval;
pub mod indexer;
pub mod name_map;
pub mod producer;
pub mod split;

pub use eval::{matches, matches_at, matches_value, MatchOptions, Query};
pub use indexer::FactIndexer;
pub use name_map::{FieldNameMap, NameMapRule};
pub use producer::{CounterProducer, FacetPlan, FactCounters};
