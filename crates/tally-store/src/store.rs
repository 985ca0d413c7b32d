//! The storage contract.

use async_trait::async_trait;

use tally_core::error::Result;
use tally_core::{Fact, FactIndexEntry};

/// Repository for facts and their derived index entries.
///
/// Implementations do I/O, so the interface is async; the core evaluation
/// pipeline never awaits and stays synchronous.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Facts whose saved index entries intersect `index_hashes`, excluding
    /// the fact identified by `excluded_fact_id` (typically the fact being
    /// evaluated). Ordered by creation time, then id.
    async fn relevant_facts(
        &self,
        index_hashes: &[String],
        excluded_fact_id: &str,
    ) -> Result<Vec<Fact>>;

    /// Persist one fact.
    async fn save_fact(&self, fact: &Fact) -> Result<()>;

    /// Persist the index entries derived from one fact.
    async fn save_fact_indexes(&self, entries: &[FactIndexEntry]) -> Result<()>;

    /// Drop every stored fact. Test affordance.
    async fn clear_facts(&self) -> Result<()>;

    /// Drop every stored index entry. Test affordance.
    async fn clear_fact_indexes(&self) -> Result<()>;
}
