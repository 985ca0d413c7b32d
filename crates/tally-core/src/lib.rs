//! # tally-core
//!
//! Core types, configuration, and abstractions for the tally relevance
//! engine.
//!
//! This crate provides the foundational data structures that the other
//! tally crates depend on: the immutable [`Fact`] model, counter catalogue
//! entries, fact-index schemas, the engine configuration, and the shared
//! error type.

pub mod config;
pub mod counter;
pub mod error;
pub mod fact;
pub mod index;
pub mod logging;

// Re-export commonly used types at crate root
pub use config::EngineConfig;
pub use counter::CounterDef;
pub use error::{Error, Result};
pub use fact::Fact;
pub use index::{FactIndexEntry, IndexSchemaRule};
