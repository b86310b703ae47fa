use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tracing_test::traced_test;

use super::{Bindings, Messaging, MessagingService};
use crate::broker::MemoryBroker;
use crate::client::{ConnectionOptions, CredentialFileProvider};
use crate::config::Settings;
use crate::pubsub::{InstanceIdentity, MessageContext};
use crate::tests::support::{publisher, recording_handler, wait_for};
use crate::utils::error::{BindingError, ConnectionError, HandlerError, MessagingError};

fn options(dir: &TempDir, credentials: &str) -> ConnectionOptions {
    ConnectionOptions {
        credentials: credentials.to_string(),
        temp_folder: dir.path().to_path_buf(),
    }
}

async fn start(broker: &MemoryBroker, identity: &str, bindings: Bindings) -> (Messaging, TempDir) {
    let dir = TempDir::new().unwrap();
    let service = MessagingService::new(
        CredentialFileProvider::new(broker.clone()),
        options(&dir, "{}"),
        InstanceIdentity::new(identity),
        bindings,
    );
    (service.start().await, dir)
}

#[test]
fn test_validate_rejects_empty_and_duplicate_topics() {
    let (handler, _) = recording_handler();
    let bindings = Bindings::new()
        .on_shared("orders", Arc::clone(&handler))
        .on_shared("", Arc::clone(&handler))
        .on_shared("orders", Arc::clone(&handler))
        .on_shared("invoices", handler);
    assert_eq!(bindings.len(), 4);

    let (accepted, rejected) = bindings.validate();
    let topics: Vec<_> = accepted.iter().map(|b| b.topic.as_str()).collect();
    assert_eq!(topics, vec!["orders", "invoices"]);
    assert_eq!(
        rejected,
        vec![
            BindingError::EmptyTopic,
            BindingError::Duplicate("orders".to_string())
        ]
    );
}

#[test]
fn test_bindings_accept_plain_closures() {
    let bindings = Bindings::new().on("orders", |_ctx: MessageContext| async move {
        Ok::<(), HandlerError>(())
    });
    assert_eq!(bindings.topics().collect::<Vec<_>>(), vec!["orders"]);
    assert!(!bindings.is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_one_failing_binding_does_not_block_the_others() {
    let broker = MemoryBroker::new();
    broker.fail_subscription("invoices.node-a");
    let (handler, _) = recording_handler();
    let bindings = Bindings::new()
        .on_shared("orders", Arc::clone(&handler))
        .on_shared("invoices", Arc::clone(&handler))
        .on_shared("refunds", handler);

    let (messaging, _dir) = start(&broker, "node-a", bindings).await;

    assert!(!messaging.is_degraded());
    let report = messaging.report();
    let mut active = report.active.clone();
    active.sort();
    assert_eq!(active, vec!["orders.node-a", "refunds.node-a"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].topic, "invoices");
    assert!(matches!(
        report.failed[0].error,
        MessagingError::SubscriptionResolution { .. }
    ));
    assert_eq!(messaging.subscriptions().len(), 2);
    assert!(messaging.subscriptions().iter().all(|s| s.is_running()));

    logs_assert(|lines: &[&str]| {
        let failures: Vec<_> = lines
            .iter()
            .filter(|line| line.contains("subscribe failed"))
            .collect();
        match failures.as_slice() {
            [line] if line.contains("topic=invoices") => Ok(()),
            other => Err(format!("expected one failure for invoices, got {other:?}")),
        }
    });
}

#[tokio::test]
#[traced_test]
async fn test_connection_failure_leaves_messaging_degraded() {
    let broker = MemoryBroker::new();
    let dir = TempDir::new().unwrap();
    let (handler, _) = recording_handler();
    let service = MessagingService::new(
        CredentialFileProvider::new(broker.clone()),
        options(&dir, "{not json"),
        InstanceIdentity::new("node-a"),
        Bindings::new().on_shared("orders", handler),
    );

    let mut messaging = service.start().await;

    assert!(messaging.is_degraded());
    assert!(matches!(
        messaging.report().connection_error,
        Some(MessagingError::Connection(ConnectionError::InvalidCredentials(_)))
    ));
    assert!(messaging.subscriptions().is_empty());
    assert!(messaging.publisher().is_none());
    assert!(!broker.has_topic("orders"));
    assert!(logs_contain("start with broker failed"));
    assert!(logs_contain("instance=node-a"));

    let err = messaging.publish("orders", &json!({})).await.unwrap_err();
    assert!(matches!(err, MessagingError::Unavailable));
    let (handler, _) = recording_handler();
    let err = messaging.subscribe("orders", handler).await.unwrap_err();
    assert!(matches!(err, MessagingError::Unavailable));
}

#[tokio::test]
async fn test_started_bindings_receive_peer_messages() {
    let broker = MemoryBroker::new();
    let (orders, seen_orders) = recording_handler();
    let (refunds, seen_refunds) = recording_handler();
    let bindings = Bindings::new()
        .on_shared("orders", orders)
        .on_shared("refunds", refunds);
    let (messaging, _dir) = start(&broker, "node-a", bindings).await;

    let peer = publisher(&broker, "node-b");
    peer.publish("orders", &json!({ "id": 1 })).await.unwrap();
    peer.publish("refunds", &json!({ "id": 2 })).await.unwrap();

    wait_for(|| seen_orders.lock().unwrap().len() == 1).await;
    wait_for(|| seen_refunds.lock().unwrap().len() == 1).await;
    assert_eq!(seen_orders.lock().unwrap()[0].params, json!({ "id": 1 }));
    assert_eq!(seen_refunds.lock().unwrap()[0].params, json!({ "id": 2 }));

    messaging.shutdown().await;
}

#[tokio::test]
async fn test_from_settings_uses_configured_identity() {
    let broker = MemoryBroker::new();
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.messaging.instance_id = "node-eu-1".to_string();
    settings.messaging.temp_folder = dir.path().to_path_buf();
    let (handler, _) = recording_handler();

    let messaging = MessagingService::from_settings(
        CredentialFileProvider::new(broker.clone()),
        &settings,
        Bindings::new().on_shared("orders", handler),
    )
    .start()
    .await;

    assert_eq!(messaging.identity().map(|i| i.as_str()), Some("node-eu-1"));
    assert!(broker.has_subscription("orders.node-eu-1"));
}

#[tokio::test]
async fn test_direct_subscribe_and_publish_after_start() {
    let broker = MemoryBroker::new();
    let (mut node_a, _dir_a) = start(&broker, "node-a", Bindings::new()).await;
    let (node_b, _dir_b) = start(&broker, "node-b", Bindings::new()).await;

    let (handler, seen) = recording_handler();
    let name = node_a
        .subscribe("orders", handler)
        .await
        .unwrap()
        .name()
        .to_string();
    assert_eq!(name, "orders.node-a");

    node_a.publish("orders", &json!({ "from": "a" })).await.unwrap();
    node_b.publish("orders", &json!({ "from": "b" })).await.unwrap();

    wait_for(|| broker.ack_count("orders.node-a") == 1).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].sender(), Some("node-b"));
}
