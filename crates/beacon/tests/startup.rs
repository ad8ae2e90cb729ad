//! Startup paths of the gateway binary.

use std::net::TcpListener;
use std::time::Duration;

use beacon::{serve, GatewayError};
use beacon_config::AppConfig;
use beacon_server::{ServerError, ShutdownSignal};

fn local_config(port: u16) -> AppConfig {
    let mut config = AppConfig {
        port,
        ..AppConfig::default()
    };
    config.server.host = "127.0.0.1".to_string();
    config
}

#[tokio::test]
async fn test_bind_conflict_is_fatal() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let err = serve(&local_config(port), ShutdownSignal::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Server(ServerError::Bind { .. })));
}

#[tokio::test]
async fn test_serves_until_shutdown() {
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { serve(&local_config(0), shutdown).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.trigger();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop")
        .expect("task should not panic");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_unreachable_database_is_fatal() {
    let mut config = local_config(0);
    config.database.development.url = Some("postgres://beacon@127.0.0.1:1/beacon".to_string());
    config.database.development.connect_timeout_secs = 1;

    let err = serve(&config, ShutdownSignal::new()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Store(_)));
}
