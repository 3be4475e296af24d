use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use config::{DEFAULT_CONFIG_PATH, load_config};
use dotfwd_cache::ResponseCache;
use dotfwd_client::{ForwardClient, TlsConnector};
use listener::Forwarder;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking;
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod listener;

/// Largest UDP query accepted from clients.
const RECV_SIZE: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (nb, _guard) = non_blocking(std::io::stdout());

    let config_path = env::var("DOTFWD_CONFIG").unwrap_or(DEFAULT_CONFIG_PATH.to_string());

    let config = load_config(&config_path)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(nb)
                .with_target(false)
                .with_filter(LevelFilter::from(config.server.log_level)),
        )
        .init();

    let bind_addr = format!("{}:{}", config.server.ip, config.server.port)
        .parse::<SocketAddr>()
        .context("invalid server address")?;

    let connector = TlsConnector::new(
        config.upstream.address,
        &config.upstream.server_name,
        config.upstream.ca_file.as_deref(),
    )?;

    let client = Arc::new(ForwardClient::new(connector, config.client_config()));
    client.start()?;

    let cache = Arc::new(ResponseCache::new(
        config.cache.min_entries,
        config.cache.max_entries,
    ));
    let reaper = (config.cache.clean_interval_secs > 0).then(|| {
        cache
            .clone()
            .start_reaper(Duration::from_secs(config.cache.clean_interval_secs))
    });

    tracing::info!(
        upstream = %config.upstream.address,
        server_name = %config.upstream.server_name,
        "forwarding over TLS"
    );

    let forwarder = Arc::new(Forwarder::new(client.clone(), cache, config.query_timeout()));

    tokio::select! {
        r = listener::run_udp(bind_addr, forwarder, RECV_SIZE) => {
            if let Err(e) = r {
                tracing::error!("DNS listener exited with error: {}", e);
            }
        },
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down...");
        },
    }

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    client.close_graceful().await;

    Ok(())
}
