use crate::SupervisorContext;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::proxy::router::RouteTable;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on the ad-hoc diagnostic probes
pub const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_millis(1500);

/// Shared, read-only state for request handlers.
///
/// One instance is built at startup and shared by every Actix worker.
/// Handlers only read the supervisor context; its fields are written by the
/// manager and prober tasks.
pub struct ProxyState {
    ctx: SupervisorContext,
    routes: RouteTable,
    /// Ordinary requests; bounded by the proxy idle timeout
    pub(crate) gateway_client: reqwest::Client,
    /// Tunnels and upgrades; no timeout once connected
    pub(crate) stream_client: reqwest::Client,
    pub(crate) probe_client: reqwest::Client,
}

impl ProxyState {
    pub fn new(ctx: SupervisorContext) -> Result<Self> {
        let config = ctx.config.as_ref();
        let routes = RouteTable::from_config(config);

        let gateway_client = loopback_client()
            .read_timeout(config.proxy_timeout())
            .build()
            .map_err(client_error)?;
        let stream_client = loopback_client().build().map_err(client_error)?;
        let probe_client = loopback_client()
            .timeout(DIAGNOSTIC_TIMEOUT)
            .build()
            .map_err(client_error)?;

        Ok(Self {
            ctx,
            routes,
            gateway_client,
            stream_client,
            probe_client,
        })
    }

    pub fn context(&self) -> &SupervisorContext {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

/// Client settings common to every loopback connection.
///
/// Redirects are relayed rather than followed, and system proxy variables
/// are ignored since the target is always local.
fn loopback_client() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .connect_timeout(CONNECT_TIMEOUT)
}

fn client_error(e: reqwest::Error) -> Error {
    Error::Other(format!("Failed to build loopback client: {}", e))
}
