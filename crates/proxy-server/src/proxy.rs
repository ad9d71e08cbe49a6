use crate::cache_layer::{CacheLayer, CacheableSet};
use crate::config::Config;
use crate::error::error_response;
use crate::headers::{allow_any_origin, strip_hop_by_hop};
use crate::metrics::GatewayStats;
use crate::upstream::UpstreamClient;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tollgate_cache::Clock;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub cache: CacheLayer,
    pub upstream: UpstreamClient,
    pub stats: Arc<GatewayStats>,
}

impl AppState {
    pub fn from_config(
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let stats = Arc::new(GatewayStats::new());
        let upstream = UpstreamClient::new(&config.origin, Arc::clone(&stats))?;
        let cache = CacheLayer::new(
            CacheableSet::new(config.cache.paths.iter().cloned()),
            config.cache.ttl(),
            config.origin.max_cached_body_bytes,
            clock,
        );

        Ok(Self {
            cache,
            upstream,
            stats,
        })
    }
}

/// Entry point for every inbound request on the gateway port.
pub async fn gateway_handler(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response<Body> {
    route(&state, req).await
}

/// Cacheable path → cache layer, anything else → pass-through.
///
/// Only the path component decides, after dot segments are resolved; the
/// query string is ignored here but is forwarded intact on the pass-through
/// side.
pub async fn route(state: &AppState, req: Request<Body>) -> Response<Body> {
    let cacheable = {
        let path = resolve_dot_segments(req.uri().path());
        state.cache.is_cacheable(&path).then(|| path.into_owned())
    };
    match cacheable {
        Some(path) => state.cache.serve(&path, &state.upstream, &state.stats).await,
        None => forward(state, req).await,
    }
}

/// Remove `.` and `..` segments from an absolute path the way URL parsing
/// does, `%2e` spellings included. `..` never climbs above the root.
pub fn resolve_dot_segments(path: &str) -> Cow<'_, str> {
    if !path.starts_with('/') || !path.split('/').any(|s| is_dot(s) || is_dot_dot(s)) {
        return Cow::Borrowed(path);
    }

    let segments: Vec<&str> = path[1..].split('/').collect();
    let last = segments.len() - 1;
    let mut out: Vec<&str> = Vec::with_capacity(segments.len());
    for (i, segment) in segments.into_iter().enumerate() {
        if is_dot_dot(segment) {
            out.pop();
        } else if !is_dot(segment) {
            out.push(segment);
            continue;
        }
        // A trailing dot segment leaves a directory path behind.
        if i == last {
            out.push("");
        }
    }

    Cow::Owned(format!("/{}", out.join("/")))
}

fn is_dot(segment: &str) -> bool {
    segment == "." || segment.eq_ignore_ascii_case("%2e")
}

fn is_dot_dot(segment: &str) -> bool {
    matches!(segment.len(), 2 | 4 | 6)
        && matches!(
            segment.to_ascii_lowercase().as_str(),
            ".." | ".%2e" | "%2e." | "%2e%2e"
        )
}

/// Forward `req` to the origin and stream the answer back.
///
/// Method, path with query, headers and body go out unchanged apart from
/// `Host`. The origin's status and headers come back with the CORS header
/// forced. Status is only committed once the origin's head is in hand, so a
/// failure before then is a clean 500.
pub async fn forward(state: &AppState, req: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let upstream_resp = match state
        .upstream
        .fetch(parts.method.clone(), path_and_query, &parts.headers, body)
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            state.stats.proxy_failed();
            tracing::error!(
                method = %parts.method,
                uri = %path_and_query,
                error = %e,
                "error proxying request"
            );
            return error_response("Proxy error");
        }
    };

    state.stats.proxied();

    let (mut resp_parts, resp_body) = upstream_resp.into_parts();
    strip_hop_by_hop(&mut resp_parts.headers);
    allow_any_origin(&mut resp_parts.headers);

    tracing::debug!(
        method = %parts.method,
        uri = %path_and_query,
        status = resp_parts.status.as_u16(),
        latency_us = start.elapsed().as_micros() as u64,
        "proxied"
    );

    Response::from_parts(resp_parts, Body::new(resp_body))
}
