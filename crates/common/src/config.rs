//! Service configuration types.

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://labs.hackthebox.com/api/v4";

/// Top-level configuration.
///
/// The three identifiers are optional on purpose: a missing one is reported
/// per request as an error mapping rather than refusing to start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Store table holding one record per day (`TABLE_NAME`).
    #[serde(default)]
    pub table_name: Option<String>,

    /// Tracked HTB account id (`USER_ID`).
    #[serde(default)]
    pub user_id: Option<String>,

    /// HTB app token (`TOKEN`).
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl StatsConfig {
    /// Copy with the token masked, for logging.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.token.is_some() {
            copy.token = Some("***".into());
        }
        copy
    }
}

/// Which persistent store backs the daily cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// SQLite database file (ignored by the memory backend).
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout for every upstream call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}
fn default_store_path() -> String {
    "htb-stats.db".into()
}
fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".into()
}
fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}
