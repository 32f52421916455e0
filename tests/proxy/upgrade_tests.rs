use super::support::{config_for, start_backend, state_for};
use bridge_runner::SupervisorContext;
use bridge_runner::proxy::{ProxyHandle, ProxyServer, ProxyState, build_app};

use actix_web::http::StatusCode;
use actix_web::test;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read until the end of an HTTP head.
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed mid-head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Accepts one handshake whose head starts with `expect`, answers with
/// `reply`, then echoes bytes back.
async fn tunnel_backend(expect: &'static str, reply: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let head = read_head(&mut socket).await.to_ascii_lowercase();
        assert!(head.contains(expect), "unexpected handshake: {}", head);
        socket.write_all(reply).await.unwrap();

        let (mut read, mut write) = socket.split();
        let _ = tokio::io::copy(&mut read, &mut write).await;
    });

    port
}

fn start_public(backing_port: u16) -> (ProxyHandle, SocketAddr) {
    let mut config = config_for(backing_port);
    config.listen.workers = 1;
    let state = ProxyState::new(SupervisorContext::new(config)).unwrap();
    let proxy = ProxyServer::start(state).unwrap();
    let public = proxy.local_addrs()[0];
    (proxy, public)
}

/// Write `ping` and expect it back unframed.
async fn assert_echo(client: &mut TcpStream) {
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .expect("no echo through the tunnel")
        .unwrap();
    assert_eq!(&buf, b"ping");
}

#[actix_web::test]
async fn test_websocket_upgrade_is_tunnelled_both_ways() {
    let backing_port = tunnel_backend(
        "upgrade: websocket",
        b"HTTP/1.1 101 Switching Protocols\r\nconnection: upgrade\r\nupgrade: websocket\r\nsec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
    )
    .await;
    let (proxy, public) = start_public(backing_port);

    let mut client = TcpStream::connect(public).await.unwrap();
    client
        .write_all(
            b"GET /ws HTTP/1.1\r\nhost: bridge\r\nconnection: Upgrade\r\nupgrade: websocket\r\nsec-websocket-version: 13\r\nsec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected head: {}", head);
    assert!(
        head.to_ascii_lowercase()
            .contains("sec-websocket-accept: s3pplmbitxaq9kygzzhzrbk+xoo=")
    );

    assert_echo(&mut client).await;

    drop(client);
    proxy.stop().await;
}

#[actix_web::test]
async fn test_connect_is_tunnelled_both_ways() {
    let backing_port = tunnel_backend(
        "connect ",
        b"HTTP/1.1 200 Connection Established\r\n\r\n",
    )
    .await;
    let (proxy, public) = start_public(backing_port);

    let mut client = TcpStream::connect(public).await.unwrap();
    client
        .write_all(b"CONNECT example.internal:443 HTTP/1.1\r\nhost: example.internal:443\r\n\r\n")
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected head: {}", head);

    assert_echo(&mut client).await;

    drop(client);
    proxy.stop().await;
}

#[actix_web::test]
async fn test_other_upgrade_tokens_are_forwarded_plainly() {
    let backend = start_backend();
    let app = test::init_service(build_app(state_for(config_for(backend.port())))).await;

    let req = test::TestRequest::get()
        .uri("/plain")
        .insert_header(("connection", "upgrade"))
        .insert_header(("upgrade", "h2c"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("x-echo-upgrade").is_none());
    assert_eq!(resp.headers().get("x-backend").unwrap(), "yes");
    backend.stop().await;
}

#[actix_web::test]
async fn test_other_upgrade_tokens_get_a_well_formed_response() {
    let backend = start_backend();
    let (proxy, public) = start_public(backend.port());

    let mut client = TcpStream::connect(public).await.unwrap();
    client
        .write_all(
            b"GET /plain HTTP/1.1\r\nhost: bridge\r\nconnection: upgrade\r\nupgrade: echo\r\n\r\n",
        )
        .await
        .unwrap();

    let head = tokio::time::timeout(Duration::from_secs(5), read_head(&mut client))
        .await
        .expect("no response head");
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected head: {}", head);
    assert!(!head.starts_with("HTTP/1.1 101"));
    assert!(head.to_ascii_lowercase().contains("x-backend: yes"));

    drop(client);
    proxy.stop().await;
    backend.stop().await;
}
