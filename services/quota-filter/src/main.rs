use anyhow::{Context, Result};
use storage_quota_filter::config::FilterConfig;
use storage_quota_filter::server::ProxyServer;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = FilterConfig::from_env().context("Failed to read quota filter environment")?;
    init_tracing(&config.log_level);

    info!(
        listen = %config.listen_addr(),
        upstream = %config.upstream_url,
        tiers = %tier_source(&config),
        "starting storage quota filter"
    );
    if config.cache_enabled {
        info!(
            ttl_secs = config.cache_timeout_secs,
            capacity = config.cache_capacity,
            "metadata cache enabled"
        );
    }
    if config.probe_token.is_none() {
        warn!("QUOTA_PROBE_TOKEN not set, metadata probes run with no token");
    }

    if let Err(e) = config.validate() {
        error!("invalid quota filter configuration: {:#}", e);
        return Err(e);
    }

    // A tier document that fails validation stops the service here, before
    // any write is admitted without a check.
    let server = ProxyServer::new(config).context("Failed to load quota tiers")?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("quota filter stopped with error: {:#}", e);
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown requested, closing listener");
        }
    }

    info!("storage quota filter stopped");
    Ok(())
}

fn tier_source(config: &FilterConfig) -> String {
    match (&config.quota_tiers, &config.quota_tiers_path) {
        (Some(_), _) => "QUOTA_TIERS".to_string(),
        (None, Some(path)) => path.display().to_string(),
        (None, None) => "unset".to_string(),
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
