//! Public HTTP surface of the bridge.
//!
//! Requests pass through the CORS middleware (which answers preflights
//! itself), are classified by the [`router`], and end up in one of:
//!
//! * [`diagnostics`] - liveness, ping and the diagnostic endpoints
//! * [`tunnel`] - unbuffered event-stream passthrough
//! * [`upgrade`] - raw tunnel for WebSocket-style upgrades
//! * [`gateway`] - ordinary reverse-proxied requests
//!
//! Every path that talks to the backing process maps loopback failures to
//! `502 bad gateway` as long as no response head has been sent.

pub mod actix_error;
pub mod cors;
pub mod diagnostics;
pub mod gateway;
pub mod handlers;
pub mod headers;
pub mod router;
pub mod server;
pub mod state;
pub mod tunnel;
pub mod types;
pub mod upgrade;

pub use cors::CorsHeaders;
pub use router::{Route, RouteTable};
pub use server::{ProxyHandle, ProxyServer, build_app};
pub use state::ProxyState;
pub use tunnel::StreamSession;
pub use types::{ProbeReport, StatusReport};
