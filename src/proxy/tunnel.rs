//! Event-stream tunnel.
//!
//! A fresh loopback request is opened per client and the upstream body is
//! handed to Actix chunk by chunk as it arrives, with no intermediate
//! buffering. When the client goes away Actix drops the body stream, which
//! drops the upstream response and closes the loopback connection.

use crate::error::{Error, Result};
use crate::proxy::headers::{EVENT_STREAM, NO_CACHE, apply_unbuffered};
use crate::proxy::state::ProxyState;

use actix_web::http::{StatusCode, header};
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse};
use futures::{Stream, StreamExt};
use std::time::{Duration, Instant};
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

/// SSE comment line; ignored by event-stream parsers.
const KEEPALIVE: &[u8] = b": keep-alive\n\n";

/// Tunnel a streaming request to the backing streaming path.
///
/// The query string of the public request is preserved. Errors before the
/// upstream response head arrives become `502`.
#[tracing::instrument(skip_all, fields(path = %req.path()))]
pub async fn stream_events(req: &HttpRequest, state: &ProxyState) -> Result<HttpResponse> {
    let backing = &state.config().backing;
    let target = match req.uri().query() {
        Some(query) if !query.is_empty() => format!("{}?{}", backing.streaming_path, query),
        _ => backing.streaming_path.clone(),
    };
    let url = backing.url_for(&target);

    let mut request = state
        .stream_client
        .get(&url)
        .header(reqwest::header::ACCEPT, EVENT_STREAM)
        .header(reqwest::header::CACHE_CONTROL, "no-cache");
    if let Some(last_id) = req.headers().get("last-event-id") {
        request = request.header("last-event-id", last_id.as_bytes());
    }

    let upstream = request.send().await.map_err(|e| {
        let err = Error::upstream(e);
        tracing::warn!(url = %url, error = %err, "Failed to open upstream event stream");
        err
    })?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = header_or(upstream.headers(), reqwest::header::CONTENT_TYPE, EVENT_STREAM);
    let cache_control = header_or(upstream.headers(), reqwest::header::CACHE_CONTROL, NO_CACHE);

    let session = StreamSession::open(req.path(), status);
    let keepalive = state
        .config()
        .proxy
        .stream_keepalive_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    let body = pipe(session, upstream.bytes_stream(), keepalive);

    let mut response = HttpResponse::build(status)
        .insert_header((header::CONTENT_TYPE, content_type))
        .insert_header((header::CACHE_CONTROL, cache_control))
        .streaming(body);
    apply_unbuffered(response.headers_mut());
    Ok(response)
}

fn header_or(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
    default: &str,
) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default)
        .to_string()
}

/// One client connected to the event stream.
///
/// Logs its own closure, whichever side ended it.
pub struct StreamSession {
    id: Uuid,
    path: String,
    opened: Instant,
    bytes: u64,
    chunks: u64,
    keepalives: u64,
    tail: Vec<u8>,
    upstream_done: bool,
}

impl StreamSession {
    pub fn open(path: &str, status: StatusCode) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(session_id = %id, path = %path, status = status.as_u16(), "Stream session opened");
        Self {
            id,
            path: path.to_string(),
            opened: Instant::now(),
            bytes: 0,
            chunks: 0,
            keepalives: 0,
            tail: Vec::with_capacity(4),
            upstream_done: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn observe(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len() as u64;
        self.chunks += 1;
        self.tail.extend_from_slice(&chunk[chunk.len().saturating_sub(4)..]);
        let excess = self.tail.len().saturating_sub(4);
        self.tail.drain(..excess);
    }

    /// The upstream ended the stream (cleanly or with an error).
    fn mark_upstream_done(&mut self) {
        self.upstream_done = true;
    }

    /// Which side ended the session.
    pub fn closed_by(&self) -> &'static str {
        if self.upstream_done {
            "upstream"
        } else {
            "client"
        }
    }

    /// Is the stream between events, so that a comment line cannot split
    /// an upstream event?
    pub fn at_event_boundary(&self) -> bool {
        self.bytes == 0
            || self.tail.ends_with(b"\n\n")
            || self.tail.ends_with(b"\r\n\r\n")
            || self.tail.ends_with(b"\r\r")
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        tracing::info!(
            session_id = %self.id,
            path = %self.path,
            bytes = self.bytes,
            chunks = self.chunks,
            keepalives = self.keepalives,
            duration_ms = self.opened.elapsed().as_millis() as u64,
            closed_by = self.closed_by(),
            "Stream session closed"
        );
    }
}

/// Relay `upstream` chunk by chunk, optionally injecting keep-alive
/// comments when upstream has been silent for `keepalive`.
pub fn pipe<S, E>(
    mut session: StreamSession,
    upstream: S,
    keepalive: Option<Duration>,
) -> impl Stream<Item = std::result::Result<Bytes, E>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut upstream = std::pin::pin!(upstream);
        let mut ticker = keepalive.map(|period| {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            // `None` means the keep-alive timer fired first
            let next = match ticker.as_mut() {
                Some(ticker) => tokio::select! {
                    chunk = upstream.next() => Some(chunk),
                    _ = ticker.tick() => None,
                },
                None => Some(upstream.next().await),
            };

            match next {
                Some(Some(Ok(chunk))) => {
                    session.observe(&chunk);
                    if let Some(ticker) = ticker.as_mut() {
                        ticker.reset();
                    }
                    yield Ok(chunk);
                }
                Some(Some(Err(e))) => {
                    tracing::warn!(session_id = %session.id(), error = %e, "Upstream event stream failed");
                    session.mark_upstream_done();
                    yield Err(e);
                    break;
                }
                Some(None) => {
                    session.mark_upstream_done();
                    break;
                }
                None => {
                    if session.at_event_boundary() {
                        session.keepalives += 1;
                        yield Ok(Bytes::from_static(KEEPALIVE));
                    }
                }
            }
        }
    }
}
