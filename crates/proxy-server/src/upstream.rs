use crate::config::OriginConfig;
use crate::error::UpstreamError;
use crate::headers::is_hop_by_hop;
use crate::metrics::GatewayStats;
use crate::tls;
use axum::body::Body;
use axum::http::header::{HeaderValue, HOST};
use axum::http::{HeaderMap, Method, Request, Response};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Client bound to the single configured origin.
///
/// Every request goes to the same scheme/authority and carries the origin's
/// own `Host` header. There are no retries; a failure is returned as-is.
#[derive(Clone)]
pub struct UpstreamClient {
    client: HttpClient,
    base: String,
    host_header: HeaderValue,
    timeout: Duration,
    stats: Arc<GatewayStats>,
}

impl UpstreamClient {
    pub fn new(
        origin: &OriginConfig,
        stats: Arc<GatewayStats>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(origin.timeout()));

        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls::client_config(origin.verify_certificates)?);
        let connector = if origin.tls {
            builder.https_only().enable_http1().wrap_connector(http)
        } else {
            builder.https_or_http().enable_http1().wrap_connector(http)
        };

        let client = Client::builder(TokioExecutor::new()).build(connector);

        let scheme = if origin.tls { "https" } else { "http" };
        let authority = authority(&origin.host, origin.port, origin.tls);
        let host_header = HeaderValue::from_str(&authority)?;

        tracing::info!(
            origin = %format!("{scheme}://{authority}"),
            verify_certificates = origin.verify_certificates,
            timeout_ms = origin.timeout_ms,
            "upstream client initialized"
        );

        Ok(Self {
            client,
            base: format!("{scheme}://{authority}"),
            host_header,
            timeout: origin.timeout(),
            stats,
        })
    }

    /// Value sent as `Host` on every outbound request.
    pub fn host(&self) -> &HeaderValue {
        &self.host_header
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request to the origin and wait for its response head.
    ///
    /// `path_and_query` is appended verbatim to the origin base. Inbound
    /// hop-by-hop headers are dropped and `Host` is overridden. The body is
    /// streamed as it arrives. The timeout bounds the wait for the response
    /// head only; the returned body is read by the caller.
    pub async fn fetch(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<Response<Incoming>, UpstreamError> {
        let uri = format!("{}{}", self.base, path_and_query);

        let mut request = Request::builder().method(method).uri(&uri).body(body)?;
        let outbound = request.headers_mut();
        for (name, value) in headers {
            if is_hop_by_hop(name.as_str()) || *name == HOST {
                continue;
            }
            outbound.append(name.clone(), value.clone());
        }
        outbound.insert(HOST, self.host_header.clone());

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.client.request(request)).await;
        self.stats.record_origin_latency(start.elapsed());

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(UpstreamError::Request(e)),
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }

    /// Plain `GET` with only the forced `Host` header and no body.
    pub async fn get(&self, path: &str) -> Result<Response<Incoming>, UpstreamError> {
        self.fetch(Method::GET, path, &HeaderMap::new(), Body::empty())
            .await
    }
}

/// `host` alone when `port` is the scheme default, `host:port` otherwise.
fn authority(host: &str, port: u16, tls: bool) -> String {
    let default_port = if tls { 443 } else { 80 };
    if port == default_port {
        host.to_string()
    } else {
        format!("{host}:{port}")
    }
}
