//! Cache-aside resolution of today's stats.
//!
//! Order of lookups: memory slot, persistent store (today's key), HTB API.
//! An upstream failure persists a date-only sentinel so the API is not hit
//! again that day; a store failure, read or write, caches nothing so the
//! next call retries the store. A stored item that no longer decodes is
//! treated as a miss and overwritten.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use common::{CacheKey, Error, Fields, Resolution, Result, StatsSnapshot, DATE_FIELD};
use htb_client::HtbClient;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::memory::MemoryCache;
use crate::store::SnapshotStore;

/// Where fresh snapshots come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<StatsSnapshot>;
}

#[async_trait]
impl SnapshotSource for HtbClient {
    async fn fetch_snapshot(&self) -> Result<StatsSnapshot> {
        HtbClient::fetch_snapshot(self).await
    }
}

/// Current local calendar date; cache keys follow the wall clock.
fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct CacheOrchestrator {
    table_name: Option<String>,
    store: Arc<dyn SnapshotStore>,
    source: Arc<dyn SnapshotSource>,
    memory: MemoryCache,
    /// Serializes cache misses so concurrent first requests share one fill.
    fill_lock: Mutex<()>,
    today: fn() -> NaiveDate,
}

impl CacheOrchestrator {
    pub fn new(
        table_name: Option<String>,
        store: Arc<dyn SnapshotStore>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        Self {
            table_name,
            store,
            source,
            memory: MemoryCache::new(),
            fill_lock: Mutex::new(()),
            today: local_today,
        }
    }

    /// Override the date source used to build cache keys.
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    /// Resolve today's stats. Always returns a mapping, never panics.
    pub async fn resolve(&self) -> Resolution {
        if let Some(fields) = self.memory.get().await {
            debug!("Memory cache hit ({} fields)", fields.len());
            return Resolution::Stats(fields);
        }

        let _fill = self.fill_lock.lock().await;
        // Another invocation may have filled the slot while we waited.
        if let Some(fields) = self.memory.get().await {
            debug!("Memory cache filled by concurrent invocation");
            return Resolution::Stats(fields);
        }

        self.resolve_miss().await
    }

    async fn resolve_miss(&self) -> Resolution {
        let key = CacheKey::for_date((self.today)());

        let Some(table) = self
            .table_name
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return Resolution::failed("TABLE_NAME not configured");
        };

        match self.store.get(table, &key).await {
            Err(Error::Json(e)) => {
                warn!("Stored item for {} does not decode, refetching: {}", key, e);
            }
            Err(e) => {
                error!("Store lookup failed (table={}, key={}): {}", table, key, e);
                return Resolution::failed_with("Database lookup failed", e);
            }
            Ok(Some(mut record)) => {
                record.remove(DATE_FIELD);
                info!("Store hit for {} ({} fields)", key, record.len());
                self.memory.set(record.clone()).await;
                return Resolution::Stats(record);
            }
            Ok(None) => info!("Store miss for {}, fetching from HTB", key),
        }

        let snapshot = match self.source.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("HTB fetch failed, writing sentinel for {}: {}", key, e);
                if let Err(put_err) = self.store.put(table, &key, key.sentinel_record()).await {
                    warn!("Sentinel write failed (table={}, key={}): {}", table, key, put_err);
                }
                return Resolution::failed(e.to_string());
            }
        };

        let fields: Fields = match snapshot.to_fields() {
            Ok(fields) => fields,
            Err(e) => return Resolution::failed_with("Error marshalling item", e),
        };

        if let Err(e) = self.store.put(table, &key, key.record_with(&fields)).await {
            error!("Store write failed (table={}, key={}): {}", table, key, e);
            return Resolution::failed_with("Error writing item to store", e);
        }

        self.memory.set(fields.clone()).await;
        Resolution::Stats(fields)
    }
}
