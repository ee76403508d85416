mod http;
mod rails;
mod source;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trend_core::cache::TrendingCache;
use trend_core::config::Config;

use crate::rails::RailRegistry;
use crate::source::DaemonSource;

fn init_logging() -> anyhow::Result<std::path::PathBuf> {
    let data_dir = trend_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Create layers: file writer + stderr
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,trend_daemon=debug")),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_path = init_logging()?;
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let source = Arc::new(DaemonSource::from_config(&config.source)?);
    info!("Reading activity from {}", source.describe());

    let cache = config.cache.enabled.then(|| {
        TrendingCache::new(
            config.cache.dir.clone(),
            Duration::from_secs(config.cache.ttl_secs),
        )
    });

    let registry = Arc::new(RailRegistry::new(source, &config, cache));
    info!("Rails: {}", registry.names().join(", "));
    registry.seed_from_cache().await;

    // Initial load: rails fetch concurrently, results land as they arrive.
    {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry.refresh_all().await;
            info!("Initial refresh complete");
        });
    }

    if let Some(cache) = registry.cache().cloned() {
        let every = Duration::from_secs(config.cache.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        });
    }

    let http_handle = if config.http.enabled {
        Some(http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            registry.clone(),
        ))
    } else {
        warn!("HTTP API disabled; nothing will serve the rails");
        None
    };

    info!("Daemon initialised, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    if let Some(handle) = http_handle {
        handle.abort();
    }

    Ok(())
}
