//! Broker client connection lifecycle.

use std::sync::Arc;
use std::time::Duration;

use courier_connectors::broker::{BrokerClient, BrokerConfig, Role};
use courier_connectors::testing::MockSessionFactory;
use courier_connectors::{ConnectorError, SessionState};

fn config() -> BrokerConfig {
    let mut cfg = BrokerConfig::new("mock:9092", "courier-tests");
    cfg.retry_initial_backoff = Duration::from_millis(1);
    cfg.retry_max_backoff = Duration::from_millis(2);
    cfg.retry_max_attempts = 3;
    cfg.connection_timeout = Duration::from_millis(200);
    cfg
}

#[tokio::test]
async fn test_send_while_disconnected_makes_exactly_one_attempt() {
    let factory = Arc::new(MockSessionFactory::new());
    factory.set_producer_unavailable(true);
    let client = BrokerClient::new(config(), factory.clone());

    let err = client.send("t", None, b"payload").await.unwrap_err();

    assert!(matches!(err, ConnectorError::BrokerConnection { .. }));
    assert_eq!(factory.producer_opens(), 1);
    assert!(factory.published().is_empty());
    assert_eq!(client.role_state(Role::Producer), SessionState::Disconnected);
}

#[tokio::test]
async fn test_send_while_disconnected_reconnects_lazily() {
    let factory = Arc::new(MockSessionFactory::new());
    let client = BrokerClient::new(config(), factory.clone());

    client.send("t", Some("n-1"), b"payload").await.unwrap();

    assert_eq!(factory.producer_opens(), 1);
    assert_eq!(factory.consumer_opens(), 0);
    assert_eq!(factory.published().len(), 1);
    assert!(client.status().producer);
    assert!(!client.status().consumer);
    assert_eq!(client.metrics().snapshot().reconnects, 1);
}

#[tokio::test]
async fn test_double_disconnect_is_harmless() {
    let factory = Arc::new(MockSessionFactory::new());
    let client = BrokerClient::new(config(), factory.clone());
    client.connect().await.unwrap();

    client.disconnect().await;
    client.disconnect().await;

    let status = client.status();
    assert!(!status.producer);
    assert!(!status.consumer);
    assert_eq!(client.role_state(Role::Producer), SessionState::Disconnected);
    assert_eq!(client.role_state(Role::Consumer), SessionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_without_connect() {
    let client = BrokerClient::new(config(), Arc::new(MockSessionFactory::new()));
    client.disconnect().await;
    assert!(!client.status().producer);
}

#[tokio::test]
async fn test_connect_after_disconnect_reopens_both_roles() {
    let factory = Arc::new(MockSessionFactory::new());
    let client = BrokerClient::new(config(), factory.clone());

    client.connect().await.unwrap();
    client.disconnect().await;
    client.connect().await.unwrap();

    assert_eq!(factory.producer_opens(), 2);
    assert_eq!(factory.consumer_opens(), 2);
    assert!(client.status().producer);
    assert!(client.status().consumer);
}

#[tokio::test]
async fn test_consumer_failure_leaves_producer_usable() {
    let factory = Arc::new(MockSessionFactory::new());
    factory.set_consumer_unavailable(true);
    let client = BrokerClient::new(config(), factory.clone());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ConnectorError::BrokerConnection { ref role, .. } if role == "consumer"));

    client.send("t", None, b"still works").await.unwrap();
    assert_eq!(factory.producer_opens(), 1);
}

#[tokio::test]
async fn test_disconnect_abandons_connect_in_flight() {
    let factory = Arc::new(MockSessionFactory::new());
    factory.set_open_delay(Duration::from_millis(50));
    let client = Arc::new(BrokerClient::new(config(), factory.clone()));

    let connecting = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.disconnect().await;

    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(err, ConnectorError::BrokerConnection { ref role, .. } if role == "producer"));

    let status = client.status();
    assert!(!status.producer);
    assert!(!status.consumer);
    assert_eq!(client.role_state(Role::Producer), SessionState::Disconnected);
    assert_eq!(client.role_state(Role::Consumer), SessionState::Disconnected);
    // The late producer session was closed and the consumer never opened.
    assert_eq!(factory.producer_opens(), 1);
    assert_eq!(factory.producer_closes(), 1);
    assert_eq!(factory.consumer_opens(), 0);

    factory.set_open_delay(Duration::ZERO);
    client.connect().await.unwrap();
    assert!(client.status().producer);
    assert!(client.status().consumer);
}

#[tokio::test]
async fn test_send_during_connect_keeps_a_single_producer() {
    let factory = Arc::new(MockSessionFactory::new());
    factory.set_open_delay(Duration::from_millis(50));
    let client = Arc::new(BrokerClient::new(config(), factory.clone()));

    let connecting = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.send("t", None, b"racing").await.unwrap();
    connecting.await.unwrap().unwrap();

    // Two producers were opened; the one that lost the race was closed.
    assert_eq!(factory.producer_opens(), 2);
    assert_eq!(factory.producer_closes(), 1);
    assert_eq!(factory.published().len(), 1);
    assert!(client.status().producer);

    client.disconnect().await;
    assert_eq!(factory.producer_closes(), 2);
    assert_eq!(factory.consumer_closes(), 1);
}
