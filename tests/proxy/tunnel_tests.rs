use super::support::{
    closed_port, config_for, eventually, next_chunk, read_until, start_backend, state_for,
};
use bridge_runner::SupervisorContext;
use bridge_runner::proxy::{ProxyServer, ProxyState, build_app};

use actix_web::http::StatusCode;
use actix_web::test;
use futures::StreamExt;
use std::time::Duration;

#[actix_web::test]
async fn test_events_arrive_in_order() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::get().uri("/sse?session=42").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert!(
        headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    // Upstream cache policy is preserved on the tunnel
    assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");

    let mut body = Box::pin(resp.into_body());
    let text = read_until(&mut body, "data: 3\n\n").await;

    // Query string reaches the backing streaming path
    assert!(text.starts_with("event: endpoint\ndata: q=session=42\n\n"));
    let first = text.find("data: 1\n\n").unwrap();
    let second = text.find("data: 2\n\n").unwrap();
    let third = text.find("data: 3\n\n").unwrap();
    assert!(first < second && second < third);

    assert_eq!(
        backend.observed.stream_accept.lock().unwrap().as_deref(),
        Some("text/event-stream")
    );
    backend.stop().await;
}

#[actix_web::test]
async fn test_client_disconnect_closes_upstream() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::get().uri("/sse").to_request();
    let resp = test::call_service(&app, req).await;
    let mut body = Box::pin(resp.into_body());
    assert!(next_chunk(&mut body).await.is_some());
    assert!(
        !backend
            .observed
            .stream_closed
            .load(std::sync::atomic::Ordering::SeqCst)
    );

    drop(body);

    assert!(
        eventually(&backend.observed.stream_closed, Duration::from_secs(3)).await,
        "backend stream still open after client left"
    );
    backend.stop().await;
}

#[actix_web::test]
async fn test_unreachable_stream_is_bad_gateway() {
    let app = test::init_service(build_app(state_for(config_for(closed_port())))).await;

    let req = test::TestRequest::get().uri("/sse").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[actix_web::test]
async fn test_events_stream_through_public_listener() {
    let backend = start_backend();
    let mut config = config_for(backend.port());
    config.listen.workers = 1;
    let state = ProxyState::new(SupervisorContext::new(config)).unwrap();
    let proxy = ProxyServer::start(state).unwrap();
    let public = proxy.local_addrs()[0];

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let response = client
        .get(format!("http://{}/sse", public))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    // The backend never ends the stream, so each event must be delivered
    // while the response is still open.
    let mut stream = Box::pin(response.bytes_stream());
    let mut text = String::new();
    let read = async {
        while !text.contains("data: 3\n\n") {
            let chunk = stream.next().await.unwrap().unwrap();
            text.push_str(&String::from_utf8_lossy(&chunk));
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("events were buffered");

    drop(stream);
    proxy.stop().await;
    backend.stop().await;
}
