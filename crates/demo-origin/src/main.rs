use axum::body::Bytes;
use axum::extract::Path;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{any, get};
use axum::{Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Simulate origin latency (5-20ms).
async fn jitter() -> u64 {
    let delay = rand::thread_rng().gen_range(5..=20);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    delay
}

async fn index() -> Html<&'static str> {
    jitter().await;
    tracing::info!(path = "/index.html", "served");
    Html("<!doctype html><html><body><h1>demo origin</h1></body></html>")
}

async fn sound() -> impl IntoResponse {
    jitter().await;
    tracing::info!(path = "/plop.mp3", "served");
    // ID3 tag header followed by silence; enough for a content-type check.
    let mut body = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    body.resize(8 * 1024, 0);
    ([(CONTENT_TYPE, "audio/mpeg")], body)
}

async fn get_item(Path(id): Path<u64>) -> Json<Value> {
    let delay = jitter().await;
    Json(json!({
        "id": id,
        "name": format!("Item {}", id),
        "latency_ms": delay,
    }))
}

/// Any method: returns the body and a few request headers.
async fn echo(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    Json(json!({
        "host": header("host"),
        "content_type": header("content-type"),
        "body_len": body.len(),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn fail() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "origin unavailable")
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app = Router::new()
        .route("/index.html", get(index))
        .route("/plop.mp3", get(sound))
        .route("/api/items/{id}", get(get_item))
        .route("/echo", any(echo))
        .route("/fail", any(fail))
        .route("/health", get(health));

    let addr = std::env::var("DEMO_ORIGIN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    tracing::info!(addr = %addr, "demo origin starting");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %addr, "failed to bind demo origin");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "demo origin server error");
    }
}
