//! In-memory reference implementation of [`FactStore`].

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use tally_core::error::Result;
use tally_core::{Fact, FactIndexEntry};

use crate::store::FactStore;

#[derive(Default)]
struct Inner {
    facts: HashMap<String, Fact>,
    indexes: Vec<FactIndexEntry>,
}

/// A process-local fact store.
///
/// Not a production backend: lookups scan every stored index entry. It
/// exists to give integration tests and examples the full pipeline
/// (index → save → relevance lookup) without external infrastructure.
#[derive(Default)]
pub struct MemoryFactStore {
    inner: RwLock<Inner>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored facts.
    pub async fn fact_count(&self) -> usize {
        self.inner.read().await.facts.len()
    }

    /// Number of stored index entries.
    pub async fn index_count(&self) -> usize {
        self.inner.read().await.indexes.len()
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn relevant_facts(
        &self,
        index_hashes: &[String],
        excluded_fact_id: &str,
    ) -> Result<Vec<Fact>> {
        let wanted: HashSet<&str> = index_hashes.iter().map(String::as_str).collect();
        let inner = self.inner.read().await;

        let ids: HashSet<&str> = inner
            .indexes
            .iter()
            .filter(|e| wanted.contains(e.hash.as_str()) && e.fact_id != excluded_fact_id)
            .map(|e| e.fact_id.as_str())
            .collect();

        let mut facts: Vec<Fact> = ids
            .into_iter()
            .filter_map(|id| inner.facts.get(id).cloned())
            .collect();
        facts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        debug!(
            hashes = index_hashes.len(),
            result_count = facts.len(),
            "relevance lookup"
        );
        Ok(facts)
    }

    async fn save_fact(&self, fact: &Fact) -> Result<()> {
        self.inner
            .write()
            .await
            .facts
            .insert(fact.id.clone(), fact.clone());
        Ok(())
    }

    async fn save_fact_indexes(&self, entries: &[FactIndexEntry]) -> Result<()> {
        self.inner.write().await.indexes.extend_from_slice(entries);
        Ok(())
    }

    async fn clear_facts(&self) -> Result<()> {
        self.inner.write().await.facts.clear();
        Ok(())
    }

    async fn clear_fact_indexes(&self) -> Result<()> {
        self.inner.write().await.indexes.clear();
        Ok(())
    }
}
