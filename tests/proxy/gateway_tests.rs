use super::support::{closed_port, config_for, start_backend, state_for};
use bridge_runner::proxy::build_app;

use actix_web::http::StatusCode;
use actix_web::test;
use std::net::SocketAddr;

fn header<'a, B>(resp: &'a actix_web::dev::ServiceResponse<B>, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

#[actix_web::test]
async fn test_body_and_headers_round_trip() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let payload = r#"{"jsonrpc":"2.0","method":"tools/list","id":7}"#;
    let req = test::TestRequest::post()
        .uri("/messages?sessionId=abc")
        .insert_header(("content-type", "application/json"))
        .insert_header(("x-custom", "kept"))
        .set_payload(payload)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    // Backend headers survive
    assert_eq!(header(&resp, "x-backend"), Some("yes"));
    assert_eq!(header(&resp, "x-echo-method"), Some("POST"));
    assert_eq!(header(&resp, "x-echo-query"), Some("sessionId=abc"));
    assert_eq!(header(&resp, "x-echo-custom"), Some("kept"));
    assert_eq!(header(&resp, "content-type"), Some("application/json"));
    // Bridge headers are added, and overwrite the backend's cache policy
    assert_eq!(header(&resp, "access-control-allow-origin"), Some("*"));
    assert_eq!(header(&resp, "cache-control"), Some("no-cache, no-transform"));
    assert_eq!(header(&resp, "pragma"), Some("no-cache"));
    assert_eq!(header(&resp, "expires"), Some("0"));
    assert_eq!(header(&resp, "x-accel-buffering"), Some("no"));

    let body = test::read_body(resp).await;
    assert_eq!(body, payload.as_bytes());
    backend.stop().await;
}

#[actix_web::test]
async fn test_forwarded_headers_are_added() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let peer: SocketAddr = "10.1.2.3:40000".parse().unwrap();
    let req = test::TestRequest::get()
        .uri("/echo")
        .insert_header(("host", "public.example.com"))
        .insert_header(("x-forwarded-for", "203.0.113.9"))
        .peer_addr(peer)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        header(&resp, "x-echo-forwarded-host"),
        Some("public.example.com")
    );
    assert_eq!(header(&resp, "x-echo-forwarded-proto"), Some("http"));
    assert_eq!(
        header(&resp, "x-echo-forwarded-for"),
        Some("203.0.113.9, 10.1.2.3")
    );
    backend.stop().await;
}

#[actix_web::test]
async fn test_hop_by_hop_headers_are_not_forwarded() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::get()
        .uri("/echo")
        .insert_header(("connection", "x-secret-hop"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_ne!(header(&resp, "x-echo-connection"), Some("x-secret-hop"));
    backend.stop().await;
}

#[actix_web::test]
async fn test_upstream_status_is_relayed() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::get().uri("/status/teapot").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(test::read_body(resp).await, "short and stout".as_bytes());

    // Redirects go back to the client untouched
    let req = test::TestRequest::get().uri("/redirect").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(header(&resp, "location"), Some("/elsewhere"));
    backend.stop().await;
}

#[actix_web::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let app = test::init_service(build_app(state_for(config_for(closed_port())))).await;

    let req = test::TestRequest::get().uri("/anything").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header(&resp, "access-control-allow-origin"), Some("*"));
    assert_eq!(test::read_body(resp).await, "bad gateway".as_bytes());
}

#[actix_web::test]
async fn test_oversize_body_is_rejected() {
    let backend = start_backend();
    let mut config = config_for(backend.port());
    config.proxy.max_body_bytes = 8;
    let app = test::init_service(build_app(state_for(config))).await;

    let req = test::TestRequest::post()
        .uri("/echo")
        .set_payload("this body is far too long")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        backend
            .observed
            .hits
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    backend.stop().await;
}

#[actix_web::test]
async fn test_head_has_no_body() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::HEAD)
        .uri("/echo")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(test::read_body(resp).await.is_empty());
    backend.stop().await;
}
