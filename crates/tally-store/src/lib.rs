//! # tally-store
//!
//! The storage interface consumed by the tally relevance engine.
//!
//! Fact storage is an external collaborator of the core pipeline: the
//! engine derives hashed index entries per fact, storage persists them and
//! answers relevance lookups by hash-set intersection. This crate defines
//! the [`FactStore`] contract and ships [`MemoryFactStore`], an in-memory
//! reference implementation backing integration tests.

pub mod memory;
pub mod store;

pub use memory::MemoryFactStore;
pub use store::FactStore;
