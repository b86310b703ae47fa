//! Delivery pipeline
//!
//! One task per subscription pulls events off the broker stream:
//! - message events are decoded, handed to the bound handler and acked on success
//! - a decode failure, handler error or handler panic is logged and the message
//!   is left unacked, so the broker redelivers it once its ack deadline lapses
//! - stream errors are logged; the loop keeps reading
//!
//! The loop ends when the stream closes or `ActiveSubscription::shutdown` is called.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broker::{EventReceiver, InboundMessage, SubscriptionEvent};
use crate::delivery::stats::{DeliveryStats, StatsSnapshot};
use crate::pubsub::handler::{MessageContext, MessageHandler, SharedHandler};
use crate::pubsub::identity::InstanceIdentity;
use crate::pubsub::publisher::Publisher;
use crate::utils::error::DeliveryError;

/// Where a delivery loop is reading from and who it runs as.
#[derive(Debug, Clone)]
pub struct Route {
    pub topic: String,
    pub subscription: String,
    pub publisher: Publisher,
}

impl Route {
    pub fn identity(&self) -> &InstanceIdentity {
        self.publisher.identity()
    }
}

/// Decodes, dispatches and acknowledges a single message.
pub async fn process_message(
    route: &Route,
    handler: &dyn MessageHandler,
    message: InboundMessage,
) -> Result<(), DeliveryError> {
    let params = serde_json::from_slice(&message.data).map_err(DeliveryError::Decode)?;
    info!(
        subscription = %route.subscription,
        message_id = %message.id,
        payload = %message.text(),
        "received message"
    );

    let ctx = MessageContext {
        params,
        topic: route.topic.clone(),
        subscription: route.subscription.clone(),
        message_id: message.id.clone(),
        attributes: message.attributes.clone(),
        publish_time: message.publish_time,
        delivery_attempt: message.delivery_attempt,
        publisher: route.publisher.clone(),
    };

    match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(DeliveryError::Handler(err)),
        Err(panic) => return Err(DeliveryError::Panicked(panic_message(panic.as_ref()))),
    }

    message.ack();
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Reads `events` until the stream closes or shutdown is signalled.
pub async fn run(
    route: Route,
    mut events: EventReceiver,
    handler: SharedHandler,
    stats: Arc<DeliveryStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut watching_shutdown = true;

    loop {
        tokio::select! {
            changed = shutdown.changed(), if watching_shutdown => match changed {
                Ok(()) if *shutdown.borrow() => {
                    info!(subscription = %route.subscription, "delivery stopped");
                    break;
                }
                Ok(()) => {}
                // handle dropped without shutting down: keep delivering
                Err(_) => watching_shutdown = false,
            },
            event = events.recv() => match event {
                Some(SubscriptionEvent::Message(message)) => {
                    let message_id = message.id.clone();
                    match process_message(&route, handler.as_ref(), message).await {
                        Ok(()) => stats.record_ack(),
                        Err(err) => {
                            stats.record_failure();
                            error!(
                                subscription = %route.subscription,
                                message_id = %message_id,
                                error = %err,
                                "received message error"
                            );
                        }
                    }
                }
                Some(SubscriptionEvent::Error(err)) => {
                    stats.record_stream_error();
                    error!(
                        instance = %route.identity(),
                        subscription = %route.subscription,
                        error = %err,
                        "received error"
                    );
                }
                None => {
                    warn!(subscription = %route.subscription, "message stream closed");
                    break;
                }
            },
        }
    }
}

/// A running delivery loop for one subscription.
#[derive(Debug)]
pub struct ActiveSubscription {
    topic: String,
    name: String,
    stats: Arc<DeliveryStats>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    /// Spawns the delivery loop for `route`.
    pub fn spawn(route: Route, events: EventReceiver, handler: SharedHandler) -> Self {
        let stats = Arc::new(DeliveryStats::default());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let topic = route.topic.clone();
        let name = route.subscription.clone();
        let task = tokio::spawn(run(route, events, handler, Arc::clone(&stats), shutdown_rx));

        Self {
            topic,
            name,
            stats,
            shutdown,
            task,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the delivery loop after the message in flight, if any.
    /// The broker-side subscription is left in place.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(subscription = %self.name, error = %err, "delivery task ended abnormally");
        }
    }
}
