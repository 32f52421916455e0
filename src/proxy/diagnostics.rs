//! Endpoints answered by the bridge itself.
//!
//! Liveness and ping never consult the backing process. The diagnostic
//! endpoints do probe it, but always answer `200` with a [`ProbeReport`] or
//! [`StatusReport`]; a failed probe is data, not an error.

use crate::proxy::headers::{EVENT_STREAM, NO_CACHE, apply_unbuffered};
use crate::proxy::state::ProxyState;
use crate::proxy::types::{ProbeReport, StatusReport};

use actix_web::HttpResponse;
use actix_web::http::header;
use actix_web::web::Bytes;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Longest backing response body echoed in a probe report
const MAX_BODY_PREVIEW: usize = 512;

/// Recent lifecycle events included in the status report
const STATUS_EVENTS: usize = 20;

/// Always `200`, regardless of the backing process.
pub fn liveness() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("ok")
}

pub fn ping() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("pong")
}

/// Probe the backing liveness path and report what came back.
pub async fn child_health(state: &ProxyState) -> HttpResponse {
    let backing = &state.config().backing;
    let url = backing.url_for(&backing.health_path);
    let started = Instant::now();

    let report = match state.probe_client.get(&url).send().await {
        Ok(response) => {
            let status = response.status();
            let content_type = content_type(response.headers());
            let (body, error) = match response.text().await {
                Ok(text) => (Some(truncate(text, MAX_BODY_PREVIEW)), None),
                Err(e) => (None, Some(format!("failed to read body: {}", e))),
            };
            ProbeReport {
                ok: status.is_success(),
                url,
                status: Some(status.as_u16()),
                content_type,
                body,
                error,
                elapsed_ms: elapsed_ms(started),
            }
        }
        Err(e) => ProbeReport::failed(url, e, elapsed_ms(started)),
    };

    tracing::debug!(ok = report.ok, status = ?report.status, "Child health probe");
    HttpResponse::Ok().json(report)
}

/// Open the backing streaming path and report the response head only.
pub async fn stream_check(state: &ProxyState) -> HttpResponse {
    let backing = &state.config().backing;
    let url = backing.url_for(&backing.streaming_path);
    let started = Instant::now();

    let request = state
        .probe_client
        .get(&url)
        .header(reqwest::header::ACCEPT, EVENT_STREAM)
        .header(reqwest::header::CACHE_CONTROL, "no-cache");

    let report = match request.send().await {
        Ok(response) => {
            let status = response.status();
            let content_type = content_type(response.headers());
            let is_event_stream = content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with(EVENT_STREAM));
            // Dropping the response here closes the stream unread
            ProbeReport {
                ok: status.is_success() && is_event_stream,
                url,
                status: Some(status.as_u16()),
                content_type,
                body: None,
                error: None,
                elapsed_ms: elapsed_ms(started),
            }
        }
        Err(e) => ProbeReport::failed(url, e, elapsed_ms(started)),
    };

    tracing::debug!(ok = report.ok, status = ?report.status, "Child stream check");
    HttpResponse::Ok().json(report)
}

pub fn status(state: &ProxyState) -> HttpResponse {
    let ctx = state.context();
    let config = state.config();

    let report = StatusReport {
        state: ctx.state(),
        uptime_secs: ctx.lifecycle.uptime_secs(),
        public_port: config.listen.port,
        target: config.backing.base_url(),
        streaming_enabled: config.backing.streaming_enabled,
        child: ctx.child.snapshot(),
        health: ctx.health.snapshot(),
        recent_events: ctx.lifecycle.recent_events(Some(STATUS_EVENTS)),
    };

    HttpResponse::Ok().json(report)
}

/// Local event stream, independent of the backing process.
///
/// Sends a reconnect hint, then a `hello` event carrying the current Unix
/// time in milliseconds once per second until the client disconnects.
pub fn test_stream() -> HttpResponse {
    let stream = async_stream::stream! {
        yield Ok::<_, actix_web::Error>(Bytes::from_static(b"retry: 1000\n\n"));

        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            yield Ok(format_event("hello", &unix_millis().to_string()));
        }
    };

    let mut response = HttpResponse::Ok()
        .content_type(EVENT_STREAM)
        .insert_header((header::CACHE_CONTROL, NO_CACHE))
        .streaming(stream);
    apply_unbuffered(response.headers_mut());
    response
}

/// Format one event for the wire
pub fn format_event(event: &str, data: &str) -> Bytes {
    let mut result = String::new();
    result.push_str(&format!("event: {}\n", event));
    for line in data.lines() {
        result.push_str(&format!("data: {}\n", line));
    }
    result.push('\n');
    Bytes::from(result)
}

fn content_type(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn truncate(mut text: String, limit: usize) -> String {
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
