use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tracing_test::traced_test;

use super::{Route, process_message};
use crate::broker::message::Acknowledger;
use crate::broker::{InboundMessage, MemoryBroker, SENDER_ATTRIBUTE};
use crate::pubsub::{MessageContext, SubscriptionManager, handler_fn};
use crate::tests::support::{failing_handler, publisher, recording_handler, wait_for};
use crate::utils::error::{BrokerError, DeliveryError, HandlerError};

#[derive(Default)]
struct CountingAcker {
    acks: AtomicUsize,
}

impl Acknowledger for CountingAcker {
    fn ack(&self, _ack_id: &str) {
        self.acks.fetch_add(1, Ordering::SeqCst);
    }
}

fn inbound(data: &[u8], acker: &Arc<CountingAcker>) -> InboundMessage {
    InboundMessage::new(
        "msg-1".to_string(),
        data.to_vec(),
        HashMap::from([(SENDER_ATTRIBUTE.to_string(), "node-b".to_string())]),
        0,
        1,
        "orders.node-a/msg-1".to_string(),
        Arc::clone(acker) as Arc<dyn Acknowledger>,
    )
}

fn route(broker: &MemoryBroker) -> Route {
    Route {
        topic: "orders".to_string(),
        subscription: "orders.node-a".to_string(),
        publisher: publisher(broker, "node-a"),
    }
}

#[tokio::test]
async fn test_process_message_acks_once_on_success() {
    let broker = MemoryBroker::new();
    let acker = Arc::new(CountingAcker::default());
    let (handler, seen) = recording_handler();

    process_message(&route(&broker), handler.as_ref(), inbound(br#"{"ok":true}"#, &acker))
        .await
        .unwrap();

    assert_eq!(acker.acks.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().unwrap()[0].params, json!({ "ok": true }));
}

#[tokio::test]
async fn test_process_message_rejects_malformed_payload() {
    let broker = MemoryBroker::new();
    let acker = Arc::new(CountingAcker::default());
    let (handler, seen) = recording_handler();

    let err = process_message(&route(&broker), handler.as_ref(), inbound(b"{oops", &acker))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Decode(_)));
    assert_eq!(acker.acks.load(Ordering::SeqCst), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_process_message_does_not_ack_on_handler_error() {
    let broker = MemoryBroker::new();
    let acker = Arc::new(CountingAcker::default());
    let (handler, _) = failing_handler();

    let err = process_message(&route(&broker), handler.as_ref(), inbound(b"{}", &acker))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Handler(_)));
    assert_eq!(acker.acks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_process_message_isolates_handler_panic() {
    let broker = MemoryBroker::new();
    let acker = Arc::new(CountingAcker::default());
    let handler = handler_fn(|_ctx: MessageContext| async move {
        if true {
            panic!("handler blew up");
        }
        Ok::<(), HandlerError>(())
    });

    let err = process_message(&route(&broker), handler.as_ref(), inbound(b"{}", &acker))
        .await
        .unwrap_err();

    match err {
        DeliveryError::Panicked(message) => assert_eq!(message, "handler blew up"),
        other => panic!("Expected Panicked, got {other:?}"),
    }
    assert_eq!(acker.acks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[traced_test]
async fn test_bad_message_leaves_subscription_active() {
    let broker = MemoryBroker::new();
    let manager = SubscriptionManager::new(publisher(&broker, "node-a"));
    let (handler, seen) = recording_handler();
    let active = manager.subscribe("orders", handler).await.unwrap();

    let peer = publisher(&broker, "node-b");
    let topic = peer.cache().get("orders").await.unwrap();
    topic
        .publish(b"not json".to_vec(), peer.identity().sender_attributes())
        .await
        .unwrap();
    peer.publish("orders", &json!({ "n": 2 })).await.unwrap();

    wait_for(|| active.stats().acked == 1).await;
    let stats = active.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(broker.ack_count("orders.node-a"), 1);
    // the malformed message is still awaiting its ack deadline
    assert_eq!(broker.pending_count(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(active.is_running());

    assert!(logs_contain("received message error"));
    assert!(logs_contain("payload is not valid JSON"));
    logs_assert(|lines: &[&str]| {
        match lines
            .iter()
            .filter(|line| line.contains("received message error"))
            .count()
        {
            1 => Ok(()),
            n => Err(format!("expected one delivery error, logged {n}")),
        }
    });
}

#[tokio::test]
#[traced_test]
async fn test_failed_message_is_redelivered_by_broker() {
    let broker = MemoryBroker::with_ack_deadline(Duration::ZERO);
    let manager = SubscriptionManager::new(publisher(&broker, "node-a"));
    let (handler, seen) = failing_handler();
    let active = manager.subscribe("orders", handler).await.unwrap();

    publisher(&broker, "node-b")
        .publish("orders", &json!({ "n": 1 }))
        .await
        .unwrap();
    wait_for(|| active.stats().failed == 1).await;

    assert_eq!(broker.redeliver_expired(), 1);
    wait_for(|| active.stats().failed == 2).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].delivery_attempt, 1);
    assert_eq!(seen[1].delivery_attempt, 2);
    assert_eq!(broker.ack_count("orders.node-a"), 0);

    assert!(logs_contain("handler rejected the message"));
    logs_assert(|lines: &[&str]| {
        match lines
            .iter()
            .filter(|line| line.contains("received message error"))
            .count()
        {
            2 => Ok(()),
            n => Err(format!("expected one error per delivery attempt, logged {n}")),
        }
    });
}

#[tokio::test]
#[traced_test]
async fn test_stream_error_is_logged_and_loop_continues() {
    let broker = MemoryBroker::new();
    let manager = SubscriptionManager::new(publisher(&broker, "node-a"));
    let (handler, _) = recording_handler();
    let active = manager.subscribe("orders", handler).await.unwrap();

    assert_eq!(
        broker.emit_stream_error(
            "orders.node-a",
            BrokerError::Unavailable("stream reset".to_string())
        ),
        1
    );
    wait_for(|| active.stats().stream_errors == 1).await;

    publisher(&broker, "node-b")
        .publish("orders", &json!({ "n": 1 }))
        .await
        .unwrap();
    wait_for(|| active.stats().acked == 1).await;
    assert!(active.is_running());

    logs_assert(|lines: &[&str]| {
        let errors: Vec<_> = lines
            .iter()
            .filter(|line| line.contains("received error"))
            .collect();
        match errors.as_slice() {
            [line] if line.contains("instance=node-a") && line.contains("stream reset") => Ok(()),
            other => Err(format!("expected one stream error for node-a, got {other:?}")),
        }
    });
}

#[tokio::test]
async fn test_shutdown_stops_delivery() {
    let broker = MemoryBroker::new();
    let manager = SubscriptionManager::new(publisher(&broker, "node-a"));
    let (handler, seen) = recording_handler();
    let active = manager.subscribe("orders", handler).await.unwrap();

    active.shutdown().await;
    publisher(&broker, "node-b")
        .publish("orders", &json!({ "n": 1 }))
        .await
        .unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(broker.backlog_len("orders.node-a"), 1);
    assert!(broker.has_subscription("orders.node-a"));
}

#[tokio::test]
async fn test_dropping_handle_keeps_delivering() {
    let broker = MemoryBroker::new();
    let manager = SubscriptionManager::new(publisher(&broker, "node-a"));
    let (handler, seen) = recording_handler();
    drop(manager.subscribe("orders", handler).await.unwrap());

    publisher(&broker, "node-b")
        .publish("orders", &json!({ "n": 1 }))
        .await
        .unwrap();
    wait_for(|| seen.lock().unwrap().len() == 1).await;
    wait_for(|| broker.ack_count("orders.node-a") == 1).await;
}
