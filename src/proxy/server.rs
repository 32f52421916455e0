//! Public listener built on Actix Web.
//!
//! Binds before anything else starts so that the platform sees an open port
//! immediately, independent of the backing process.

use crate::error::{Error, Result};
use crate::proxy::cors::CorsHeaders;
use crate::proxy::handlers;
use crate::proxy::state::ProxyState;

use actix_web::body::MessageBody;
use actix_web::dev::{ServerHandle, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, middleware, web::{self, Data}};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Seconds in-flight requests get to finish on a graceful stop
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Build the application: CORS and request logging around one dispatcher.
///
/// Shared by the listener and the HTTP-surface tests.
pub fn build_app(
    state: Data<ProxyState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(state)
        .wrap(CorsHeaders)
        .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
        .default_service(web::to(handlers::dispatch))
}

/// Handle to the running listener
pub struct ProxyHandle {
    handle: ServerHandle,
    task: JoinHandle<()>,
    addrs: Vec<SocketAddr>,
}

impl ProxyHandle {
    /// Addresses actually bound (useful when the configured port is 0)
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Stop accepting, let in-flight requests finish, and close the listener.
    pub async fn stop(self) {
        tracing::info!("Stopping public listener");
        self.handle.stop(true).await;

        let grace = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS + 1);
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => tracing::info!("Public listener closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Listener task ended abnormally"),
            Err(_) => tracing::warn!("Timeout waiting for listener task to finish"),
        }
    }
}

pub struct ProxyServer;

impl ProxyServer {
    /// Bind the public listener and start serving in a background task.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound; this is fatal for the unit.
    pub fn start(state: ProxyState) -> Result<ProxyHandle> {
        let listen = state.config().listen.clone();
        let idle_timeout = state.config().idle_timeout();
        let data = Data::new(state);

        tracing::info!(
            address = %listen.address,
            port = listen.port,
            workers = listen.workers,
            "Starting public listener"
        );

        let server = HttpServer::new(move || build_app(data.clone()))
            .workers(listen.workers)
            .keep_alive(idle_timeout)
            .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
            .disable_signals()
            .bind((listen.address.as_str(), listen.port))
            .map_err(|e| {
                Error::Other(format!(
                    "Failed to bind {}:{}: {}",
                    listen.address, listen.port, e
                ))
            })?;

        let addrs = server.addrs();
        let server = server.run();
        let handle = server.handle();

        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Public listener failed");
            }
        });

        tracing::info!(addrs = ?addrs, "Public listener bound");
        Ok(ProxyHandle {
            handle,
            task,
            addrs,
        })
    }
}
