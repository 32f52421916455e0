use super::support::{config_for, start_backend, state_for};
use bridge_runner::proxy::build_app;

use actix_web::http::{Method, StatusCode};
use actix_web::test;
use std::sync::atomic::Ordering;

#[actix_web::test]
async fn test_preflight_is_answered_locally() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/api/anything")
        .insert_header(("origin", "https://app.example.com"))
        .insert_header(("access-control-request-method", "POST"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let headers = resp.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(headers.get("access-control-allow-headers").unwrap(), "*");
    assert_eq!(headers.get("access-control-max-age").unwrap(), "86400");
    let methods = headers
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    for method in ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"] {
        assert!(methods.contains(method), "missing {}", method);
    }

    assert_eq!(backend.observed.hits.load(Ordering::SeqCst), 0);
    backend.stop().await;
}

#[actix_web::test]
async fn test_preflight_wins_over_builtin_paths() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    for path in ["/health", "/sse", "/_bridge/status"] {
        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri(path)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT, "path {}", path);
    }

    assert!(
        !backend
            .observed
            .methods
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == "OPTIONS")
    );
    backend.stop().await;
}

#[actix_web::test]
async fn test_builtin_responses_carry_cors() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::get().uri("/ping").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    backend.stop().await;
}
