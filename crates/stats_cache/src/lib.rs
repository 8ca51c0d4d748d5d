//! Two-tier daily stats cache.
//!
//! The orchestrator serves from an in-process memory slot, falls back to a
//! persistent store keyed by date, and only then calls the HTB API.

pub mod memory;
pub mod orchestrator;
pub mod store;

pub use memory::MemoryCache;
pub use orchestrator::{CacheOrchestrator, SnapshotSource};
pub use store::{open_store, MemoryStore, SnapshotStore, SqliteStore};
