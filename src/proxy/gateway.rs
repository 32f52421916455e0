//! Reverse proxy gateway for ordinary requests.
//!
//! The request body is buffered (up to `proxy.maxBodyBytes`) and sent to the
//! loopback target in one piece; the response body is streamed back as it
//! arrives. Upstream failures before a response head propagate as
//! [`Error::Upstream`] and render as `502`. A failure after that point ends
//! the body stream, which drops the client connection.

use crate::error::{Error, Result};
use crate::proxy::headers::{
    add_forwarded, apply_no_cache, apply_unbuffered, from_upstream, is_hop_by_hop, to_upstream,
};
use crate::proxy::state::ProxyState;

use actix_web::http::{Method, StatusCode};
use actix_web::web::{self, Bytes, BytesMut};
use actix_web::{HttpRequest, HttpResponse};
use futures::{StreamExt, TryStreamExt};

/// Forward one request to the backing process and relay its response.
#[tracing::instrument(skip_all, fields(method = %req.method(), path = %req.path()))]
pub async fn forward(
    req: &HttpRequest,
    payload: web::Payload,
    state: &ProxyState,
) -> Result<HttpResponse> {
    let limit = state.config().proxy.max_body_bytes;
    let Some(body) = read_body(payload, limit).await? else {
        tracing::warn!(limit, "Request body too large");
        return Ok(HttpResponse::PayloadTooLarge()
            .content_type("text/plain; charset=utf-8")
            .body("payload too large"));
    };

    let url = state.config().backing.url_for(path_and_query(req));
    let mut headers = to_upstream(req.headers(), is_hop_by_hop);
    add_forwarded(req, &mut headers);

    let mut request = state
        .gateway_client
        .request(upstream_method(req.method())?, &url)
        .headers(headers);
    if !body.is_empty() {
        request = request.body(body);
    }

    let upstream = request.send().await.map_err(|e| {
        let err = Error::upstream(e);
        tracing::warn!(url = %url, error = %err, "Upstream request failed");
        err
    })?;

    tracing::debug!(status = upstream.status().as_u16(), "Upstream responded");
    Ok(relay(req.method(), upstream))
}

/// Turn an upstream response into a streamed client response.
///
/// Upstream headers are copied (minus hop-by-hop ones), then the
/// cache-disabling and unbuffering headers overwrite whatever was sent.
pub(crate) fn relay(method: &Method, upstream: reqwest::Response) -> HttpResponse {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = HttpResponse::build(status);
    for header in from_upstream(upstream.headers(), is_hop_by_hop) {
        builder.append_header(header);
    }

    let bodyless = *method == Method::HEAD
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || status.is_informational();

    let mut response = if bodyless {
        builder.finish()
    } else {
        let length = upstream.content_length();
        let body = upstream.bytes_stream().inspect_err(|e| {
            tracing::warn!(error = %e, "Upstream body failed mid-response");
        });
        match length {
            Some(len) => builder.no_chunking(len).streaming(body),
            None => builder.streaming(body),
        }
    };

    apply_no_cache(response.headers_mut());
    apply_unbuffered(response.headers_mut());
    response
}

/// Collect the request body, or `None` if it exceeds `limit` bytes.
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Option<Bytes>> {
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk =
            chunk.map_err(|e| Error::Other(format!("Failed to read request body: {}", e)))?;
        if body.len() + chunk.len() > limit {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Some(body.freeze()))
}

pub(crate) fn path_and_query(req: &HttpRequest) -> &str {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
}

pub(crate) fn upstream_method(method: &Method) -> Result<reqwest::Method> {
    reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| Error::Other(format!("Unsupported method {}: {}", method, e)))
}
