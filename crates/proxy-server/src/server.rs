use crate::metrics::{prometheus_handler, stats_handler, MetricsState};
use crate::proxy::{gateway_handler, AppState};
use axum::routing::{any, get};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Gateway router: every method on every path goes to the dispatcher.
pub fn gateway_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{*path}", any(gateway_handler))
        .route("/", any(gateway_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Admin router on its own port: JSON stats and Prometheus scrape.
pub fn admin_router(state: MetricsState) -> Router {
    Router::new()
        .route("/api/stats", get(stats_handler))
        .route("/metrics", get(prometheus_handler))
        .with_state(state)
}

/// Serve both routers until `shutdown` is cancelled or one of them fails.
pub async fn run(
    gateway_listener: TcpListener,
    admin_listener: TcpListener,
    state: Arc<AppState>,
    metrics: MetricsState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let gateway = axum::serve(gateway_listener, gateway_router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let admin = axum::serve(admin_listener, admin_router(metrics))
        .with_graceful_shutdown(shutdown.cancelled_owned());

    tokio::select! {
        result = gateway => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "gateway server error");
            }
            result
        }
        result = admin => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "admin server error");
            }
            result
        }
    }
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }

    tracing::info!("shutdown signal received, draining connections...");
    token.cancel();
}
