//! Header policy shared by the gateway, tunnel and built-in endpoints.
//!
//! Actix Web and `reqwest` sit on different major versions of the `http`
//! crate, so headers cross the boundary as raw name/value bytes.

use actix_web::HttpRequest;
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};

pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
pub const CORS_MAX_AGE_SECS: &str = "86400";
pub const NO_CACHE: &str = "no-cache, no-transform";
pub const EVENT_STREAM: &str = "text/event-stream";

/// Tells nginx-style intermediaries not to buffer the response.
pub const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
    // Recomputed for the next hop
    "host",
    "content-length",
];

/// Check if a header should be forwarded on an ordinary request/response.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Check if a header should be forwarded on a protocol-upgrade request.
///
/// `connection` and `upgrade` carry the handshake itself and are kept.
pub fn is_hop_by_hop_for_upgrade(name: &str) -> bool {
    !name.eq_ignore_ascii_case("connection")
        && !name.eq_ignore_ascii_case("upgrade")
        && is_hop_by_hop(name)
}

/// Allow-all CORS headers, applied to every response.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(CORS_MAX_AGE_SECS),
    );
}

/// Cache-disabling headers; overwrite whatever the backing process sent.
pub fn apply_no_cache(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

pub fn apply_unbuffered(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static(X_ACCEL_BUFFERING),
        HeaderValue::from_static("no"),
    );
}

/// Copy inbound request headers into a `reqwest` header map.
///
/// Headers rejected by `skip`, or that do not survive conversion, are
/// dropped.
pub fn to_upstream(
    headers: &HeaderMap,
    skip: fn(&str) -> bool,
) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if skip(name.as_str()) {
            continue;
        }
        let converted = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        );
        match converted {
            (Ok(name), Ok(value)) => {
                out.append(name, value);
            }
            _ => tracing::debug!(header = %name, "Dropping unconvertible request header"),
        }
    }
    out
}

/// Add `x-forwarded-*` metadata describing the original request.
pub fn add_forwarded(req: &HttpRequest, headers: &mut reqwest::header::HeaderMap) {
    let info = req.connection_info().clone();

    if let Ok(host) = reqwest::header::HeaderValue::from_str(info.host()) {
        headers.insert("x-forwarded-host", host);
    }
    if let Ok(proto) = reqwest::header::HeaderValue::from_str(info.scheme()) {
        headers.insert("x-forwarded-proto", proto);
    }

    if let Some(peer) = req.peer_addr() {
        let ip = peer.ip().to_string();
        let chain = match req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, ip),
            _ => ip,
        };
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&chain) {
            headers.insert("x-forwarded-for", value);
        }
    }
}

/// Copy upstream response headers into an Actix header map.
pub fn from_upstream(
    upstream: &reqwest::header::HeaderMap,
    skip: fn(&str) -> bool,
) -> Vec<(HeaderName, HeaderValue)> {
    upstream
        .iter()
        .filter(|(name, _)| !skip(name.as_str()))
        .filter_map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_str().as_bytes()).ok()?;
            let value = HeaderValue::from_bytes(value.as_bytes()).ok()?;
            Some((name, value))
        })
        .collect()
}

/// Does the `connection` header ask for a protocol upgrade?
pub fn wants_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(header::UPGRADE)
}

/// Is this a WebSocket handshake?
///
/// Actix Web hands the raw post-handshake bytes to the handler only for
/// WebSocket upgrades and `CONNECT`; any other upgrade token arrives with an
/// empty payload and cannot be tunnelled.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    wants_upgrade(headers)
        && headers
            .get_all(header::UPGRADE)
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
}
