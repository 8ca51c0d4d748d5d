//! Process-lifetime memory cache.
//!
//! A single slot behind a `tokio::sync::RwLock`: every invocation reads it,
//! only the first resolution writes it. Nothing expires it; a restart does.

use common::Fields;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: RwLock<Option<Fields>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the cached fields. An empty map still counts as a hit.
    pub async fn get(&self) -> Option<Fields> {
        self.slot.read().await.clone()
    }

    pub async fn set(&self, fields: Fields) {
        *self.slot.write().await = Some(fields);
    }

    pub async fn is_populated(&self) -> bool {
        self.slot.read().await.is_some()
    }
}
