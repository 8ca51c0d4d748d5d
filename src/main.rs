//! htb-stats: daily Hack The Box stats behind a two-tier cache.
//!
//! Single-binary Tokio application that:
//! 1. Loads config from .env, config.toml and the environment
//! 2. Opens the persistent daily store
//! 3. Serves today's stats over HTTP (or resolves once with `--once`)

mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use htb_client::HtbClient;
use stats_cache::{open_store, CacheOrchestrator};
use tracing::{error, info};

/// Hack The Box stats cache
#[derive(Parser)]
#[command(name = "htb-stats", about = "Cached Hack The Box profile stats")]
struct Cli {
    /// Resolve once, print the JSON mapping, and exit.
    #[arg(long)]
    once: bool,

    /// Print the effective configuration (token redacted) and exit.
    #[arg(long)]
    check_config: bool,

    /// Path to the optional TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "htb_stats=info,htb_client=info,stats_cache=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if cli.check_config {
        match toml::to_string_pretty(&cfg.redacted()) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                error!("Could not render config: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    info!(
        "Table: {}, account: {}, store: {:?}, upstream: {}",
        cfg.table_name.as_deref().unwrap_or("<unset>"),
        cfg.user_id.as_deref().unwrap_or("<unset>"),
        cfg.store.backend,
        cfg.upstream.base_url,
    );

    let store = match open_store(&cfg.store) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };
    let client = match HtbClient::new(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build HTB client: {}", e);
            std::process::exit(1);
        }
    };

    let orchestrator = Arc::new(CacheOrchestrator::new(
        cfg.table_name.clone(),
        store,
        Arc::new(client),
    ));

    // ── One-shot mode ────────────────────────────────────────────────
    if cli.once {
        let mapping = orchestrator.resolve().await.into_mapping();
        match serde_json::to_string_pretty(&mapping) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                error!("Could not render result: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = server::serve(&cfg.server.bind_addr, orchestrator).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
