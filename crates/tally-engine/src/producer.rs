//! Counter producer: owns the validated counter catalogue and orchestrates
//! the evaluator per fact.
//!
//! Construction loads, validates, optionally rewrites (compact mode) and
//! optionally splits the catalogue, then freezes it. Per fact, a
//! type-keyed candidate slice is selected (cached), computation conditions
//! select the contributing counters, and evaluation conditions count the
//! counters the fact perturbs.
//!
//! The producer is safe to share across worker threads: after construction
//! all owned state is effectively immutable, and the candidate caches are
//! filled at most once per type behind a lock; a lost race merely
//! recomputes the same slice.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use tally_core::error::{Error, Result};
use tally_core::{CounterDef, EngineConfig, Fact};

use crate::eval::{self, MatchOptions, Query};
use crate::name_map::FieldNameMap;
use crate::split::split_counter;

/// How many parent directories a relative catalogue path may climb.
const CATALOGUE_SEARCH_DEPTH: usize = 3;

/// Result of matching one fact against the catalogue.
#[derive(Debug, Clone)]
pub struct FactCounters {
    /// Counters the fact contributes to, in the cache's sort order.
    pub contributing: Vec<Arc<CounterDef>>,

    /// Number of counters whose recomputation the fact triggers. A metric,
    /// not a result.
    pub affected_count: usize,
}

/// Legacy facet-style output of [`CounterProducer::make`], suitable for a
/// downstream aggregation pipeline.
#[derive(Debug, Clone)]
pub struct FacetPlan {
    /// Counter name → two-stage `[match-filter, group-with-attributes]`
    /// sequence.
    pub facet: Map<String, Value>,

    /// Index-type names touched by the matched counters.
    pub index_type_names: BTreeSet<String>,
}

#[derive(Debug)]
struct CounterEntry {
    def: Arc<CounterDef>,
    computation: Query,
    evaluation: Query,
}

enum Pass {
    Computation,
    Evaluation,
}

/// The frozen catalogue plus its lazily-filled candidate caches.
#[derive(Debug)]
pub struct CounterProducer {
    config: EngineConfig,
    entries: Vec<CounterEntry>,
    contributing_opts: MatchOptions,
    affected_opts: MatchOptions,
    probe_opts: MatchOptions,
    computation_cache: RwLock<HashMap<i64, Arc<Vec<usize>>>>,
    evaluation_cache: RwLock<HashMap<i64, Arc<Vec<usize>>>>,
}

impl CounterProducer {
    /// Build the producer from parsed counter definitions.
    pub fn new(
        defs: Vec<CounterDef>,
        config: EngineConfig,
        name_map: Arc<FieldNameMap>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for def in &defs {
            def.validate()?;
            if !seen.insert(def.name.clone()) {
                return Err(Error::Catalogue(format!(
                    "duplicate counter name '{}'",
                    def.name
                )));
            }
        }

        let defs = if config.use_short_names {
            rewrite_catalogue(defs, &name_map)?
        } else {
            defs
        };

        let defs: Vec<CounterDef> = match config.split_intervals.as_deref() {
            Some(boundaries) if !boundaries.is_empty() => defs
                .into_iter()
                .flat_map(|def| split_counter(def, boundaries))
                .collect(),
            _ => defs,
        };

        let entries: Vec<CounterEntry> = defs
            .into_iter()
            .map(|def| {
                let computation = Query::parse(&def.computation_conditions);
                let evaluation =
                    Query::parse(def.evaluation_conditions.as_ref().unwrap_or(&Value::Null));
                CounterEntry {
                    def: Arc::new(def),
                    computation,
                    evaluation,
                }
            })
            .collect();

        info!(counters = entries.len(), "counter catalogue frozen");

        let type_field = config.message_type_field.clone();
        Ok(Self {
            contributing_opts: MatchOptions {
                undefined_is_true: false,
                message_type_field: type_field.clone(),
            },
            affected_opts: MatchOptions {
                undefined_is_true: config.undefined_field_is_true,
                message_type_field: type_field.clone(),
            },
            probe_opts: MatchOptions {
                undefined_is_true: true,
                message_type_field: type_field,
            },
            config,
            entries,
            computation_cache: RwLock::new(HashMap::new()),
            evaluation_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Build the producer from raw catalogue entries.
    pub fn from_values(
        values: &[Value],
        config: EngineConfig,
        name_map: Arc<FieldNameMap>,
    ) -> Result<Self> {
        let defs = values
            .iter()
            .map(CounterDef::from_value)
            .collect::<Result<Vec<_>>>()?;
        Self::new(defs, config, name_map)
    }

    /// Load the catalogue from a UTF-8 JSON array file.
    ///
    /// Relative paths are resolved against the current working directory
    /// and up to three parent directories. An absent relative file
    /// degrades to an empty catalogue with a warning; an absent absolute
    /// path is fatal.
    pub fn from_file(
        path: impl AsRef<Path>,
        config: EngineConfig,
        name_map: Arc<FieldNameMap>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let Some(resolved) = resolve_catalogue_path(path) else {
            if path.is_absolute() {
                return Err(Error::Catalogue(format!(
                    "catalogue file {} not found",
                    path.display()
                )));
            }
            warn!(
                path = %path.display(),
                "catalogue file not found; starting with an empty catalogue"
            );
            return Self::new(Vec::new(), config, name_map);
        };

        let text = std::fs::read_to_string(&resolved)?;
        let values: Vec<Value> = serde_json::from_str(&text)
            .map_err(|e| Error::Catalogue(format!("{}: {e}", resolved.display())))?;
        info!(
            path = %resolved.display(),
            entries = values.len(),
            "loading counter catalogue"
        );
        Self::from_values(&values, config, name_map)
    }

    /// Number of counters in the frozen catalogue (after splitting).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalogue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The frozen counter definitions, in catalogue order.
    pub fn defs(&self) -> impl Iterator<Item = &CounterDef> {
        self.entries.iter().map(|e| e.def.as_ref())
    }

    /// Match one fact against the catalogue.
    ///
    /// Returns the contributing counters (in the cache's sort order) and
    /// the affected-counter count, or `None` when nothing contributes or
    /// the fact carries no payload. `allowed_names` restricts the
    /// contributing pass to the named counters.
    pub fn fact_counters(
        &self,
        fact: &Fact,
        allowed_names: Option<&[String]>,
    ) -> Option<FactCounters> {
        if fact.payload.is_empty() {
            warn!(fact_id = %fact.id, "fact has no payload; skipping");
            return None;
        }

        let started = Instant::now();
        let now = Utc::now();

        let candidates = self.candidates(fact.fact_type, Pass::Computation);
        let mut contributing = Vec::new();
        for &i in candidates.iter() {
            let entry = &self.entries[i];
            if let Some(allowed) = allowed_names {
                if !allowed.iter().any(|n| n == &entry.def.name) {
                    continue;
                }
            }
            if eval::matches_at(fact, &entry.computation, now, &self.contributing_opts) {
                if entry.def.attributes.is_none() {
                    warn!(
                        counter = %entry.def.name,
                        "counter has no attributes; skipping"
                    );
                    continue;
                }
                contributing.push(entry.def.clone());
            } else if self.config.debug_mode {
                debug!(
                    counter = %entry.def.name,
                    fact_id = %fact.id,
                    "computation conditions did not match"
                );
            }
        }

        let eval_candidates = self.candidates(fact.fact_type, Pass::Evaluation);
        let affected_count = eval_candidates
            .iter()
            .filter(|&&i| {
                eval::matches_at(fact, &self.entries[i].evaluation, now, &self.affected_opts)
            })
            .count();

        debug!(
            fact_id = %fact.id,
            fact_type = fact.fact_type,
            candidates = candidates.len(),
            contributing = contributing.len(),
            affected = affected_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "fact evaluated"
        );

        if contributing.is_empty() {
            None
        } else {
            Some(FactCounters {
                contributing,
                affected_count,
            })
        }
    }

    /// Legacy facet-style matching.
    ///
    /// Each contributing counter maps to a two-stage sequence
    /// `[{"$match": …}, {"$group": {"_id": null, …attributes}}]` keyed by
    /// the counter name, plus the set of index-type names touched. Same
    /// matching rules as the contributing pass of [`Self::fact_counters`].
    pub fn make(&self, fact: &Fact) -> Option<FacetPlan> {
        if fact.payload.is_empty() {
            warn!(fact_id = %fact.id, "fact has no payload; skipping");
            return None;
        }

        let now = Utc::now();
        let candidates = self.candidates(fact.fact_type, Pass::Computation);

        let mut facet = Map::new();
        let mut index_type_names = BTreeSet::new();
        for &i in candidates.iter() {
            let entry = &self.entries[i];
            if !eval::matches_at(fact, &entry.computation, now, &self.contributing_opts) {
                continue;
            }
            let Some(attrs) = entry.def.attributes.as_ref() else {
                warn!(counter = %entry.def.name, "counter has no attributes; skipping");
                continue;
            };

            let mut group = Map::new();
            group.insert("_id".to_string(), Value::Null);
            for (key, agg) in attrs {
                group.insert(key.clone(), agg.clone());
            }
            facet.insert(
                entry.def.name.clone(),
                json!([
                    { "$match": entry.def.computation_conditions.clone() },
                    { "$group": group },
                ]),
            );
            index_type_names.insert(entry.def.index_type_name.clone());
        }

        if facet.is_empty() {
            None
        } else {
            Some(FacetPlan {
                facet,
                index_type_names,
            })
        }
    }

    /// The type-keyed candidate slice for one pass, filling the cache on
    /// first request.
    ///
    /// A counter qualifies when its conditions hold for a payload-less
    /// stub fact of the type under the missing-field-matches policy, so a
    /// counter without a message-type predicate qualifies for every type.
    /// Slices are sorted by (`toTimeMs`, `fromTimeMs`) ascending; the sort
    /// is stable, so equal windows keep catalogue order.
    fn candidates(&self, fact_type: i64, pass: Pass) -> Arc<Vec<usize>> {
        let cache = match pass {
            Pass::Computation => &self.computation_cache,
            Pass::Evaluation => &self.evaluation_cache,
        };

        if let Some(hit) = cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&fact_type)
        {
            return Arc::clone(hit);
        }

        let stub = Fact::stub(fact_type);
        let mut indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                let query = match pass {
                    Pass::Computation => &entry.computation,
                    Pass::Evaluation => &entry.evaluation,
                };
                eval::matches(&stub, query, &self.probe_opts)
            })
            .map(|(i, _)| i)
            .collect();
        indices.sort_by_key(|&i| self.entries[i].def.window());

        debug!(fact_type, candidates = indices.len(), "candidate cache fill");

        let slice = Arc::new(indices);
        Arc::clone(
            cache
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(fact_type)
                .or_insert(slice),
        )
    }
}

/// Resolve a catalogue path against the working directory and up to three
/// parent directories. Absolute paths resolve only to themselves.
fn resolve_catalogue_path(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }
    let mut base = std::env::current_dir().ok()?;
    for _ in 0..=CATALOGUE_SEARCH_DEPTH {
        let candidate = base.join(path);
        if candidate.exists() {
            return Some(candidate);
        }
        if !base.pop() {
            break;
        }
    }
    None
}

fn rewrite_catalogue(defs: Vec<CounterDef>, name_map: &FieldNameMap) -> Result<Vec<CounterDef>> {
    defs.into_iter()
        .map(|mut def| {
            let mut unmapped = name_map.unmapped_fields(&def.computation_conditions);
            if let Some(conditions) = def.evaluation_conditions.as_ref() {
                unmapped.extend(name_map.unmapped_fields(conditions));
            }
            if let Some(attrs) = def.attributes.as_ref() {
                unmapped.extend(name_map.unmapped_fields(&Value::Object(attrs.clone())));
            }
            unmapped.sort();
            unmapped.dedup();
            if !unmapped.is_empty() {
                return Err(Error::NameMap(format!(
                    "counter '{}': no short name for {}",
                    def.name,
                    unmapped.join(", ")
                )));
            }

            def.computation_conditions = name_map.transform_condition(&def.computation_conditions);
            def.evaluation_conditions = def
                .evaluation_conditions
                .as_ref()
                .map(|v| name_map.transform_condition(v));
            def.attributes = def.attributes.as_ref().map(|a| name_map.transform_attributes(a));
            Ok(def)
        })
        .collect()
}
