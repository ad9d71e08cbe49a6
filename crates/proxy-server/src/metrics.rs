use crate::proxy::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hdrhistogram::Histogram;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for recorded origin latency (60s, in microseconds).
const MAX_LATENCY_US: u64 = 60_000_000;

/// Request counters and origin latency for the gateway.
///
/// Every event is mirrored to the `metrics` facade so the Prometheus
/// exporter sees it; the local copies back `/api/stats`.
pub struct GatewayStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    refresh_failures: AtomicU64,
    uncached_refreshes: AtomicU64,
    proxied: AtomicU64,
    proxy_failures: AtomicU64,
    origin_latency_us: Mutex<Histogram<u64>>,
}

impl GatewayStats {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_LATENCY_US, 3).unwrap(); // constant bounds are valid
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
            uncached_refreshes: AtomicU64::new(0),
            proxied: AtomicU64::new(0),
            proxy_failures: AtomicU64::new(0),
            origin_latency_us: Mutex::new(histogram),
        }
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("tollgate_cache_hits_total").increment(1);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("tollgate_cache_misses_total").increment(1);
    }

    pub fn refresh_failed(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("tollgate_cache_refresh_failures_total").increment(1);
    }

    /// Refresh answered by streaming the origin body instead of storing it.
    pub fn refresh_uncached(&self) {
        self.uncached_refreshes.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("tollgate_cache_uncached_refreshes_total").increment(1);
    }

    pub fn proxied(&self) {
        self.proxied.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("tollgate_proxied_total").increment(1);
    }

    pub fn proxy_failed(&self) {
        self.proxy_failures.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("tollgate_proxy_failures_total").increment(1);
    }

    /// Time until the origin's response head arrived (or the call failed).
    pub fn record_origin_latency(&self, elapsed: Duration) {
        let us = (elapsed.as_micros() as u64).clamp(1, MAX_LATENCY_US);
        self.origin_latency_us.lock().saturating_record(us);
        ::metrics::histogram!("tollgate_origin_latency_seconds").record(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let latency = {
            let h = self.origin_latency_us.lock();
            LatencySnapshot {
                samples: h.len(),
                p50_us: h.value_at_quantile(0.5),
                p99_us: h.value_at_quantile(0.99),
                max_us: h.max(),
            }
        };

        StatsSnapshot {
            cache_hits: hits,
            cache_misses: misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            uncached_refreshes: self.uncached_refreshes.load(Ordering::Relaxed),
            proxied: self.proxied.load(Ordering::Relaxed),
            proxy_failures: self.proxy_failures.load(Ordering::Relaxed),
            origin_latency: latency,
        }
    }
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    pub refresh_failures: u64,
    pub uncached_refreshes: u64,
    pub proxied: u64,
    pub proxy_failures: u64,
    pub origin_latency: LatencySnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryStats {
    pub path: String,
    pub bytes: usize,
    pub age_ms: u64,
    pub fresh: bool,
}

/// State for the admin router.
#[derive(Clone)]
pub struct MetricsState {
    pub app: Arc<AppState>,
    pub prometheus: Option<PrometheusHandle>,
}

/// GET /api/stats: counters plus the age of every cached path.
pub async fn stats_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let cache = &state.app.cache;
    let now = cache.now();
    let entries: Vec<EntryStats> = cache
        .store()
        .snapshot()
        .iter()
        .map(|e| EntryStats {
            path: e.path.clone(),
            bytes: e.body.len(),
            age_ms: e.age(now).as_millis() as u64,
            fresh: e.is_fresh(now, cache.ttl()),
        })
        .collect();

    Json(serde_json::json!({
        "stats": state.app.stats.snapshot(),
        "ttl_ms": cache.ttl().as_millis() as u64,
        "cacheable_paths": cache.paths().iter().collect::<Vec<_>>(),
        "entries": entries,
    }))
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "prometheus recorder not installed".to_string(),
        ),
    }
}
