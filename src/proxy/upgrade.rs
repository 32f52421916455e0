//! Protocol-upgrade forwarding (WebSocket handshakes, `CONNECT`).
//!
//! The handshake is replayed against the loopback target. If the backing
//! process agrees (`101 Switching Protocols`, or a `2xx` to `CONNECT`) both
//! sides become a raw byte pipe: client bytes arrive through the request
//! payload and are written to the upgraded upstream connection, and
//! upstream bytes are streamed back as the response body. Any other
//! upstream answer is relayed like an ordinary gateway response.
//!
//! Only these two cases are routed here; Actix Web delivers the raw client
//! bytes through the payload for nothing else.

use crate::error::{Error, Result};
use crate::proxy::gateway::{path_and_query, relay, upstream_method};
use crate::proxy::headers::{
    add_forwarded, from_upstream, is_hop_by_hop, is_hop_by_hop_for_upgrade, to_upstream,
};
use crate::proxy::state::ProxyState;

use actix_web::http::{Method, StatusCode};
use actix_web::{HttpRequest, HttpResponse, web};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

#[tracing::instrument(skip_all, fields(method = %req.method(), path = %req.path()))]
pub async fn forward_upgrade(
    req: &HttpRequest,
    mut payload: web::Payload,
    state: &ProxyState,
) -> Result<HttpResponse> {
    let url = state.config().backing.url_for(path_and_query(req));
    let mut headers = to_upstream(req.headers(), is_hop_by_hop_for_upgrade);
    add_forwarded(req, &mut headers);

    let upstream = state
        .stream_client
        .request(upstream_method(req.method())?, &url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| {
            let err = Error::upstream(e);
            tracing::warn!(url = %url, error = %err, "Upstream upgrade request failed");
            err
        })?;

    let connect = req.method() == Method::CONNECT;
    let accepted = if connect {
        upstream.status().is_success()
    } else {
        upstream.status() == reqwest::StatusCode::SWITCHING_PROTOCOLS
    };
    if !accepted {
        tracing::debug!(
            status = upstream.status().as_u16(),
            "Upstream declined the upgrade"
        );
        return Ok(relay(req.method(), upstream));
    }

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::OK);
    let protocol = if connect {
        "connect".to_string()
    } else {
        upstream
            .headers()
            .get(reqwest::header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("websocket")
            .to_string()
    };
    let handshake_headers = from_upstream(upstream.headers(), is_hop_by_hop);

    let upgraded = upstream.upgrade().await.map_err(|e| {
        let err = Error::upstream(e);
        tracing::warn!(error = %err, "Upstream upgrade failed");
        err
    })?;
    let (upstream_read, mut upstream_write) = tokio::io::split(upgraded);

    tracing::info!(protocol = %protocol, "Upgraded connection established");

    // Client -> backing. Runs until the client stops sending or the upstream
    // write side closes.
    actix_web::rt::spawn(async move {
        while let Some(chunk) = payload.next().await {
            match chunk {
                Ok(bytes) => {
                    if let Err(e) = upstream_write.write_all(&bytes).await {
                        tracing::debug!(error = %e, "Upgraded upstream closed");
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Upgraded client stream ended");
                    break;
                }
            }
        }
        let _ = upstream_write.shutdown().await;
    });

    let mut response = HttpResponse::build(status);
    if !connect {
        response.upgrade(protocol);
    }
    for header in handshake_headers {
        response.insert_header(header);
    }

    // Backing -> client
    Ok(response.streaming(ReaderStream::new(upstream_read)))
}
