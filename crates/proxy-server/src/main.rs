use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tollgate_cache::SystemClock;
use tollgate_proxy::metrics::MetricsState;
use tollgate_proxy::server;
use tollgate_proxy::{AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config_path = std::env::var_os("TOLLGATE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(c) => {
                tracing::info!(path = %config_path.display(), "loaded config");
                c
            }
            Err(e) => {
                tracing::error!(
                    path = %config_path.display(),
                    error = %e,
                    "failed to load config, using defaults"
                );
                Config::default_config()
            }
        }
    } else {
        tracing::info!(path = %config_path.display(), "no config file found, using defaults");
        Config::default_config()
    };

    let prometheus = match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = %e, "failed to install prometheus recorder");
            None
        }
    };

    let state = Arc::new(AppState::from_config(&config, Arc::new(SystemClock))?);
    let metrics_state = MetricsState {
        app: Arc::clone(&state),
        prometheus,
    };

    let listen_addr = &config.server.listen_addr;
    let metrics_addr = &config.server.metrics_addr;

    tracing::info!(
        listen = %listen_addr,
        metrics = %metrics_addr,
        origin = %config.origin.host,
        origin_port = config.origin.port,
        ttl_ms = config.cache.ttl().as_millis() as u64,
        cacheable = ?config.cache.paths,
        "tollgate starting"
    );

    let gateway_listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| format!("failed to bind gateway to {listen_addr}: {e}"))?;
    let admin_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .map_err(|e| format!("failed to bind metrics to {metrics_addr}: {e}"))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(server::shutdown_signal(shutdown.clone()));

    server::run(gateway_listener, admin_listener, state, metrics_state, shutdown).await?;

    tracing::info!("tollgate shut down");
    Ok(())
}
