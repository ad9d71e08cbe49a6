use axum::http::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION, TRANSFER_ENCODING};
use axum::http::HeaderMap;

/// Connection-scoped headers that are never copied across the gateway.
/// The HTTP layer on each side frames the body itself.
pub fn is_hop_by_hop(name: &str) -> bool {
    name.eq_ignore_ascii_case(CONNECTION.as_str())
        || name.eq_ignore_ascii_case(TRANSFER_ENCODING.as_str())
}

/// Drop hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    headers.remove(CONNECTION);
    headers.remove(TRANSFER_ENCODING);
}

/// Set `Access-Control-Allow-Origin: *`, replacing any origin-supplied value.
pub fn allow_any_origin(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
}
