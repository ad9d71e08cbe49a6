use crate::error::{error_response, UpstreamError};
use crate::headers::{allow_any_origin, strip_hop_by_hop};
use crate::metrics::GatewayStats;
use crate::upstream::UpstreamClient;
use axum::body::Body;
use axum::http::{HeaderMap, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tollgate_cache::{CacheEntry, CacheStore, Clock};

/// Fixed set of paths eligible for caching. Membership is exact string
/// equality on the request path; query and fragment never take part.
#[derive(Debug, Clone, Default)]
pub struct CacheableSet {
    paths: BTreeSet<String>,
}

impl CacheableSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Serves cacheable paths from the store, refetching from the origin once
/// an entry is older than the TTL.
///
/// Concurrent misses on the same path each fetch independently and the last
/// `put` wins. A failed fetch leaves the store untouched.
pub struct CacheLayer {
    store: CacheStore,
    paths: CacheableSet,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_body_size: usize,
}

impl CacheLayer {
    pub fn new(paths: CacheableSet, ttl: Duration, max_body_size: usize, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(
            paths = ?paths.iter().collect::<Vec<_>>(),
            ttl_secs = ttl.as_secs_f64(),
            max_body_size,
            "cache layer initialized"
        );

        Self {
            store: CacheStore::new(),
            paths,
            clock,
            ttl,
            max_body_size,
        }
    }

    #[inline]
    pub fn is_cacheable(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn paths(&self) -> &CacheableSet {
        &self.paths
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Entry for `path` if present and still fresh.
    pub fn lookup(&self, path: &str) -> Option<Arc<CacheEntry>> {
        self.store
            .get(path)
            .filter(|entry| entry.is_fresh(self.clock.now(), self.ttl))
    }

    /// Answer a request for a cacheable path.
    ///
    /// Fresh entry → 200 with the stored headers and body. Otherwise one GET
    /// to the origin; success is stored and served as 200, a transport
    /// failure becomes a plain-text 500. A body too large or too slow to
    /// hold is streamed through as 200 without being stored.
    pub async fn serve(&self, path: &str, upstream: &UpstreamClient, stats: &GatewayStats) -> Response<Body> {
        if let Some(entry) = self.lookup(path) {
            stats.cache_hit();
            tracing::debug!(
                path = %path,
                age_ms = entry.age(self.clock.now()).as_millis() as u64,
                "cache HIT"
            );
            return entry_response(&entry);
        }

        stats.cache_miss();
        tracing::info!(path = %path, "cache MISS → origin");

        match self.refresh(path, upstream).await {
            Ok(Refill::Stored(entry)) => entry_response(&entry),
            Ok(Refill::Uncached(response)) => {
                stats.refresh_uncached();
                response
            }
            Err(e) => {
                stats.refresh_failed();
                tracing::error!(path = %path, error = %e, "failed to refresh cached path");
                error_response("Error fetching file")
            }
        }
    }

    /// Fetch `path` from the origin and store the full body.
    ///
    /// The body is buffered up to `max_body_size` bytes and within the
    /// upstream timeout. Past either limit the bytes read so far and the
    /// rest of the body are handed back as a streaming response instead.
    async fn refresh(&self, path: &str, upstream: &UpstreamClient) -> Result<Refill, UpstreamError> {
        let response = upstream.get(path).await?;
        let (parts, mut body) = response.into_parts();

        if !parts.status.is_success() {
            tracing::warn!(
                path = %path,
                status = parts.status.as_u16(),
                "origin answered a cacheable path with a non-success status, caching anyway"
            );
        }

        let deadline = tokio::time::Instant::now() + upstream.timeout();
        let mut buf = BytesMut::new();
        loop {
            let frame = match tokio::time::timeout_at(deadline, body.frame()).await {
                Ok(Some(frame)) => frame.map_err(|e| UpstreamError::Body(Box::new(e)))?,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        path = %path,
                        timeout_ms = upstream.timeout().as_millis() as u64,
                        read = buf.len(),
                        "origin body still arriving at timeout, serving uncached"
                    );
                    return Ok(Refill::Uncached(streamed_response(parts.headers, buf.freeze(), body)));
                }
            };

            if let Ok(data) = frame.into_data() {
                buf.extend_from_slice(&data);
                if buf.len() > self.max_body_size {
                    tracing::warn!(
                        path = %path,
                        limit = self.max_body_size,
                        "origin body exceeds cache limit, serving uncached"
                    );
                    return Ok(Refill::Uncached(streamed_response(parts.headers, buf.freeze(), body)));
                }
            }
        }

        let entry = self
            .store
            .put(path, buf.freeze(), parts.headers, self.clock.now());

        tracing::info!(path = %path, bytes = entry.body.len(), "cached path refreshed");
        Ok(Refill::Stored(entry))
    }
}

enum Refill {
    Stored(Arc<CacheEntry>),
    Uncached(Response<Body>),
}

/// 200 with the entry's origin headers, hop-by-hop removed and the CORS
/// header forced.
fn entry_response(entry: &CacheEntry) -> Response<Body> {
    let mut response = Response::new(Body::from(entry.body.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    *headers = entry.headers.clone();
    strip_hop_by_hop(headers);
    allow_any_origin(headers);

    response
}

/// Same shape as [`entry_response`], but the body is `head` followed by
/// whatever is left of the origin body.
fn streamed_response(mut headers: HeaderMap, head: Bytes, rest: Incoming) -> Response<Body> {
    strip_hop_by_hop(&mut headers);
    allow_any_origin(&mut headers);

    let stream = stream::once(async move { Ok::<_, hyper::Error>(head) }).chain(rest.into_data_stream());
    let mut response = Response::new(Body::from_stream(stream));
    *response.headers_mut() = headers;
    response
}
