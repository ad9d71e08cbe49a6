use axum::body::Body;
use axum::http::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{Response, StatusCode};
use std::time::Duration;

/// Failure talking to the origin. Every variant maps to a 500 for the caller.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connect, DNS, TLS handshake or reset before the response head arrived.
    #[error("origin request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("origin did not respond within {0:?}")]
    Timeout(Duration),
    #[error("failed to read origin response body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to build origin request: {0}")]
    Build(#[from] axum::http::Error),
}

/// Plain-text 500 carrying the CORS header, with `message` as the body.
///
/// The underlying error is logged by the caller and never echoed back.
pub fn error_response(message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn error_response_is_plain_text_500_with_cors() {
        let response = error_response("Proxy error");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Proxy error");
    }

    #[test]
    fn timeout_display_names_the_limit() {
        let err = UpstreamError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "origin did not respond within 250ms");
    }
}
