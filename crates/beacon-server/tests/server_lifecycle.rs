//! Socket-level tests: bind, serve, shut down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use beacon_config::AppConfig;
use beacon_server::{App, Server, ServerConfig, ServerError, ShutdownSignal};
use beacon_store::MemoryStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn server(addr: SocketAddr) -> Server {
    server_with(addr, &AppConfig::default())
}

fn server_with(addr: SocketAddr, app_config: &AppConfig) -> Server {
    let config = ServerConfig::builder()
        .addr(addr)
        .shutdown_timeout(Duration::from_secs(2))
        .build();
    Server::new(config, App::new(app_config, Arc::new(MemoryStore::new())))
}

async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_serves_root_and_shuts_down() {
    let bound = server("127.0.0.1:0".parse().unwrap()).bind().await.unwrap();
    let addr = bound.local_addr();
    assert_ne!(addr.port(), 0);

    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));

    let response = raw_request(
        addr,
        "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.contains(r#"{"user":"Lighthouse Labs"}"#));
    assert!(response.to_ascii_lowercase().contains("x-ratelimit-remaining: 29"));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_create_over_the_wire() {
    let bound = server("127.0.0.1:0".parse().unwrap()).bind().await.unwrap();
    let addr = bound.local_addr();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));

    let body = "name=Ada&email=ada%40example.com";
    let response = raw_request(
        addr,
        &format!(
            "POST /api/users HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 201 Created"), "{response}");
    assert!(response.contains(r#""email":"ada@example.com""#));

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}

/// Reads until the peer closes or resets; an early 413 may leave unread
/// request bytes behind, which some platforms turn into a reset.
async fn read_response(stream: &mut TcpStream) -> String {
    let mut response = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_oversized_body_rejected_while_streaming() {
    let mut config = AppConfig::default();
    config.body.limit_bytes = 1024;
    let bound = server_with("127.0.0.1:0".parse().unwrap(), &config)
        .bind()
        .await
        .unwrap();
    let addr = bound.local_addr();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));

    // Announce 512 MiB but send only a few KiB: the answer must not wait
    // for the rest
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"POST /api/users HTTP/1.1\r\nHost: localhost\r\n\
              Content-Type: application/json\r\nContent-Length: 536870912\r\n\r\n",
        )
        .await
        .unwrap();
    stream.write_all(&[b' '; 4096]).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(3), read_response(&mut stream))
        .await
        .expect("server should answer before the body ends");
    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large"), "{response}");
    assert!(response.contains(r#""code":"payload_too_large""#), "{response}");

    let headers = response.to_ascii_lowercase();
    assert!(headers.contains("x-content-type-options: nosniff"));
    assert!(!headers.contains("x-ratelimit-remaining"));

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_conflict() {
    let first = server("127.0.0.1:0".parse().unwrap()).bind().await.unwrap();
    let taken = first.local_addr();

    let err = server(taken).bind().await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { addr, .. } if addr == taken));
}
