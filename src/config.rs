//! Configuration loader — merges env vars, .env file, and config.toml.

use common::config::{StatsConfig, StoreBackend};
use common::Error;
use std::path::Path;
use stats_cache::store::validate_table_name;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

/// Blank values count as unset.
fn non_blank(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn validate_config(config: &StatsConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.upstream.timeout_secs == 0 {
        issues.push("upstream.timeout_secs must be > 0".into());
    }
    if config.upstream.base_url.trim().is_empty() {
        issues.push("upstream.base_url must not be empty".into());
    }
    if config.store.backend == StoreBackend::Sqlite && config.store.path.trim().is_empty() {
        issues.push("store.path is required for the sqlite backend".into());
    }
    if config.server.bind_addr.trim().is_empty() {
        issues.push("server.bind_addr must not be empty".into());
    }
    // An absent table is reported per request; a malformed one is a typo.
    if let Some(table) = &config.table_name {
        if let Err(e) = validate_table_name(table) {
            issues.push(e.to_string());
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides using `lookup` for variable access.
fn apply_env_overrides<F>(config: &mut StatsConfig, lookup: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(table) = lookup("TABLE_NAME") {
        config.table_name = non_blank(table);
    }
    if let Some(user_id) = lookup("USER_ID") {
        config.user_id = non_blank(user_id);
    }
    if let Some(token) = lookup("TOKEN") {
        config.token = non_blank(token);
    }
    if let Some(url) = lookup("HTB_API_BASE_URL").and_then(non_blank) {
        config.upstream.base_url = url;
    }
    if let Some(raw) = lookup("HTB_REQUEST_TIMEOUT_SECS") {
        config.upstream.timeout_secs = parse_positive_u64(&raw, "HTB_REQUEST_TIMEOUT_SECS")?;
    }
    if let Some(raw) = lookup("HTB_STORE_BACKEND") {
        config.store.backend = match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => StoreBackend::Sqlite,
            "memory" => StoreBackend::Memory,
            _ => {
                return Err(Error::Config(
                    "HTB_STORE_BACKEND must be one of: sqlite, memory".into(),
                ));
            }
        };
    }
    if let Some(path) = lookup("HTB_STORE_PATH").and_then(non_blank) {
        config.store.path = path;
    }
    if let Some(addr) = lookup("HTB_BIND_ADDR").and_then(non_blank) {
        config.server.bind_addr = addr;
    }
    Ok(())
}

/// Parse `path` as TOML, or return defaults when the file does not exist.
fn read_config_file(path: &Path) -> Result<StatsConfig, Error> {
    if !path.exists() {
        return Ok(StatsConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load configuration from environment and optional config file.
pub fn load_config(config_path: &Path) -> Result<StatsConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, then config.toml if present.
    let mut config = read_config_file(config_path)?;

    // 3. Environment variables win.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;
    Ok(config)
}
