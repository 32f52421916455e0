use bridge_runner::config::Config;
use bridge_runner::proxy::{Route, RouteTable};

use actix_web::http::Method;
use actix_web::http::header::{self, HeaderMap, HeaderValue};

fn no_headers() -> HeaderMap {
    HeaderMap::new()
}

#[test]
fn test_custom_paths_are_honoured() {
    let mut config = Config::default();
    config.routes.liveness_path = "/livez".to_string();
    config.routes.ping_path = "/_ping".to_string();
    config.proxy.streaming_paths = vec!["/sse".to_string(), "/mcp/events".to_string()];
    let table = RouteTable::from_config(&config);

    assert_eq!(table.resolve(&Method::GET, "/livez", &no_headers()), Route::Liveness);
    assert_eq!(table.resolve(&Method::GET, "/_ping", &no_headers()), Route::Ping);
    // The default liveness path is now an ordinary backing path
    assert_eq!(table.resolve(&Method::GET, "/health", &no_headers()), Route::Gateway);
    assert_eq!(table.resolve(&Method::GET, "/mcp/events", &no_headers()), Route::Tunnel);
}

#[test]
fn test_streaming_disabled_forwards_streaming_paths() {
    let mut config = Config::default();
    config.backing.streaming_enabled = false;
    let table = RouteTable::from_config(&config);

    assert_eq!(table.resolve(&Method::GET, "/sse", &no_headers()), Route::Gateway);
}

#[test]
fn test_post_to_streaming_path_is_gateway() {
    let table = RouteTable::from_config(&Config::default());
    assert_eq!(table.resolve(&Method::POST, "/sse", &no_headers()), Route::Gateway);
}

#[test]
fn test_upgrade_beats_tunnel() {
    let table = RouteTable::from_config(&Config::default());
    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));

    assert_eq!(table.resolve(&Method::GET, "/sse", &headers), Route::Upgrade);
    assert_eq!(table.resolve(&Method::GET, "/ws", &headers), Route::Upgrade);
}

#[test]
fn test_builtin_classification() {
    assert!(Route::Liveness.is_builtin());
    assert!(Route::Status.is_builtin());
    assert!(!Route::Tunnel.is_builtin());
    assert!(!Route::Gateway.is_builtin());
}
