//! Persistence layer for epictrack.
//!
//! The whole cache for one repository is read, mutated in memory, and
//! written back as a unit.
//!
//! # Submodules
//!
//! - [`cache_store`] - Per-identity JSON cache files
//! - [`file`] - Atomic write helper

pub mod cache_store;
pub mod file;

pub use cache_store::CacheStore;
pub use file::atomic_write;
