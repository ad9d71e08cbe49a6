//! Shared utilities for gateway integration tests.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tollgate_cache::ManualClock;
use tollgate_proxy::config::OriginConfig;
use tollgate_proxy::metrics::GatewayStats;
use tollgate_proxy::server::gateway_router;
use tollgate_proxy::upstream::UpstreamClient;
use tollgate_proxy::{AppState, CacheLayer, CacheableSet};
use tower::ServiceExt;

/// What the mock origin saw for one request.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SeenRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
}

#[derive(Default)]
pub struct OriginState {
    hits: Mutex<HashMap<String, u64>>,
    seen: Mutex<Vec<SeenRequest>>,
}

/// Local origin behind a switchable TCP front door.
///
/// While `broken` is set every connection is accepted and dropped without a
/// byte written, which the gateway sees as a transport failure. Every
/// response carries `Connection: close` so the gateway never reuses a
/// connection opened before the switch.
pub struct MockOrigin {
    pub addr: SocketAddr,
    state: Arc<OriginState>,
    broken: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockOrigin {
    pub async fn start() -> Self {
        let state = Arc::new(OriginState::default());

        let app = Router::new()
            .route("/{*path}", any(origin_handler))
            .route("/", any(origin_handler))
            .with_state(Arc::clone(&state));

        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(backend, app).await;
        });

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = front.local_addr().unwrap();
        let broken = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&broken);
        tokio::spawn(async move {
            while let Ok((mut inbound, _)) = front.accept().await {
                if flag.load(Ordering::SeqCst) {
                    drop(inbound);
                    continue;
                }
                tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(backend_addr).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
            }
        });

        Self { addr, state, broken }
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    /// Requests the origin answered for `path` (query excluded).
    pub fn hits(&self, path: &str) -> u64 {
        self.state.hits.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> u64 {
        self.state.hits.lock().values().sum()
    }

    pub fn last_seen(&self) -> Option<SeenRequest> {
        self.state.seen.lock().last().cloned()
    }

    pub fn origin_config(&self) -> OriginConfig {
        origin_config_for(self.addr)
    }
}

pub fn origin_config_for(addr: SocketAddr) -> OriginConfig {
    OriginConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        tls: false,
        verify_certificates: true,
        timeout_ms: 2_000,
        max_cached_body_bytes: 1024 * 1024,
    }
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn origin_handler(State(state): State<Arc<OriginState>>, req: Request<Body>) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".into());

    let count = {
        let mut hits = state.hits.lock();
        let n = hits.entry(path.clone()).or_insert(0);
        *n += 1;
        *n
    };
    state.seen.lock().push(SeenRequest {
        method: parts.method.to_string(),
        path_and_query: path_and_query.clone(),
        headers: parts.headers.clone(),
    });

    let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();

    let mut builder = Response::builder()
        .header(CONNECTION, "close")
        .header("x-fetch-count", count.to_string())
        .header("x-origin-header", "kept");

    let response = match path.as_str() {
        "/a.txt" | "/index.html" | "/plop.mp3" => builder
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("hello")),
        "/echo" => {
            let host = parts.headers.get(HOST).cloned().unwrap_or(HeaderValue::from_static(""));
            let custom = parts
                .headers
                .get("x-custom")
                .cloned()
                .unwrap_or(HeaderValue::from_static(""));
            builder = builder
                .status(StatusCode::CREATED)
                .header(ACCESS_CONTROL_ALLOW_ORIGIN, "https://worldguessr.com")
                .header("x-echo-method", parts.method.as_str())
                .header("x-echo-uri", path_and_query.as_str())
                .header("x-echo-host", host)
                .header("x-echo-custom", custom);
            builder.body(Body::from(body))
        }
        "/big" => builder.body(Body::from(vec![b'x'; 1024 * 1024])),
        // First chunk at once, the rest 600ms later.
        "/trickle" => {
            let chunks = futures_util::stream::iter([(0u64, "part-1,"), (600, "part-2")]).then(
                |(delay_ms, chunk)| async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok::<_, std::convert::Infallible>(Bytes::from_static(chunk.as_bytes()))
                },
            );
            builder
                .header(CONTENT_TYPE, "text/plain")
                .body(Body::from_stream(chunks))
        }
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            builder.body(Body::from("slow"))
        }
        "/missing" => builder
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("not found")),
        other => builder.body(Body::from(format!("origin:{other}"))),
    };

    response.unwrap()
}

/// Gateway state pointed at `origin`, caching `paths` for exactly `ttl`
/// against a manual clock.
pub fn gateway_state(
    origin: OriginConfig,
    paths: &[&str],
    ttl: Duration,
) -> (Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let stats = Arc::new(GatewayStats::new());
    let max_body = origin.max_cached_body_bytes;
    let state = AppState {
        upstream: UpstreamClient::new(&origin, Arc::clone(&stats)).unwrap(),
        cache: CacheLayer::new(
            CacheableSet::new(paths.iter().copied()),
            ttl,
            max_body,
            clock.clone(),
        ),
        stats,
    };
    (Arc::new(state), clock)
}

/// Send one request through the gateway router without a socket.
pub async fn send(state: &Arc<AppState>, req: Request<Body>) -> Response<Body> {
    gateway_router(Arc::clone(state)).oneshot(req).await.unwrap()
}

pub async fn get(state: &Arc<AppState>, uri: &str) -> Response<Body> {
    send(state, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
