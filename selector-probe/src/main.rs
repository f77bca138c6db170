//! Selector Probe - Main entry point
//!
//! Seeds an in-memory registry from `SELECTOR_SERVERS`, builds a selector
//! over it with the TCP dialer and issues `SELECTOR_CALLS` selections.
//!
//! `SELECTOR_SERVERS` is a comma separated list of server keys, each
//! optionally followed by `?` and its metadata, e.g.
//! `tcp@127.0.0.1:8972?weight=2,tcp@127.0.0.1:8973?weight=1`.

use selector::{MemoryRegistry, Selector, SelectorConfig, TcpDialer};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CALLS: usize = 10;

/// Split `key?metadata` entries
fn parse_servers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('?') {
            Some((key, meta)) => (key.to_string(), meta.to_string()),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration from environment
    let config = SelectorConfig::from_env();
    let calls = std::env::var("SELECTOR_CALLS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CALLS);

    let registry = Arc::new(MemoryRegistry::new());
    let servers = parse_servers(&std::env::var("SELECTOR_SERVERS").unwrap_or_default());
    for (server, meta) in &servers {
        registry.put(format!("{}/{}", config.base_path.trim_end_matches('/'), server), meta.as_str());
    }

    info!(
        base_path = %config.base_path,
        mode = %config.select_mode,
        servers = servers.len(),
        "Starting selector probe"
    );

    let selector = Selector::builder(registry, Arc::new(TcpDialer))
        .config(config)
        .build()
        .await?;

    for i in 0..calls {
        let args = vec!["probe".to_string(), i.to_string()];
        match selector.select(&args).await {
            Ok(client) => info!(call = i, server = %client.server(), "Selected"),
            Err(err) => warn!(call = i, error = %err, "Selection failed"),
        }
    }

    let reachable = selector.all_clients().await;
    info!(
        known = selector.server_count(),
        reachable = reachable.len(),
        "Probe finished"
    );
    for client in reachable {
        client.close();
    }

    selector.shutdown().await;
    Ok(())
}
