//! Single entry point for every routed request.

use crate::error::Result;
use crate::proxy::router::Route;
use crate::proxy::state::ProxyState;
use crate::proxy::{diagnostics, gateway, tunnel, upgrade};

use actix_web::{HttpRequest, HttpResponse, web};

/// Resolve the route and hand the request to its handler.
pub async fn dispatch(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<ProxyState>,
) -> Result<HttpResponse> {
    let route = state
        .routes()
        .resolve(req.method(), req.path(), req.headers());
    tracing::trace!(route = ?route, path = %req.path(), "Routing request");

    match route {
        Route::Liveness => Ok(diagnostics::liveness()),
        Route::Ping => Ok(diagnostics::ping()),
        Route::ChildHealth => Ok(diagnostics::child_health(&state).await),
        Route::StreamCheck => Ok(diagnostics::stream_check(&state).await),
        Route::Status => Ok(diagnostics::status(&state)),
        Route::TestStream => Ok(diagnostics::test_stream()),
        Route::Tunnel => tunnel::stream_events(&req, &state).await,
        Route::Upgrade => upgrade::forward_upgrade(&req, payload, &state).await,
        Route::Gateway => gateway::forward(&req, payload, &state).await,
    }
}
