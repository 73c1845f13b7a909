//! Client IP extraction from HTTP headers.

use axum::http::HeaderMap;
use std::net::IpAddr;

/// Extract the client IP: prefer the first `x-forwarded-for` entry,
/// trimmed; fall back to the socket remote address. The header value is
/// recorded verbatim rather than parsed, so proxy-mangled entries still
/// show up in the scan history.
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| socket_addr.to_string())
}
