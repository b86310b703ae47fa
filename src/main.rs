//! Runs a messaging-enabled node against the in-process broker.
//!
//! The node binds a `greetings` handler, then a peer instance publishes a
//! greeting so the delivery path can be watched in the logs.

use std::time::Duration;

use pubsub_bridge::broker::MemoryBroker;
use pubsub_bridge::client::CredentialFileProvider;
use pubsub_bridge::config::load_config;
use pubsub_bridge::topic::TopicCache;
use pubsub_bridge::utils::error::HandlerError;
use pubsub_bridge::utils::logging;
use pubsub_bridge::{Bindings, InstanceIdentity, MessageContext, MessagingService, Publisher};
use serde_json::json;
use tracing::{error, info};

async fn greet(ctx: MessageContext) -> Result<(), HandlerError> {
    let name = ctx
        .params
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or("greeting without a name")?;
    info!(from = ctx.sender().unwrap_or("unknown"), "Hello, {name}!");
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&settings.logging.level);

    let broker =
        MemoryBroker::with_ack_deadline(Duration::from_millis(settings.messaging.ack_deadline_ms));
    tokio::spawn(MemoryBroker::start_redelivery_loop(broker.clone()));

    let bindings = Bindings::new().on("greetings", greet);
    let messaging = MessagingService::from_settings(
        CredentialFileProvider::new(broker.clone()),
        &settings,
        bindings,
    )
    .start()
    .await;

    if !messaging.is_degraded() {
        let peer = Publisher::new(
            TopicCache::new(std::sync::Arc::new(broker.clone())),
            InstanceIdentity::new(format!("{}-peer", settings.messaging.instance_id)),
        );
        if let Err(e) = peer.publish("greetings", &json!({ "name": "Bob" })).await {
            error!("Peer publish failed: {}", e);
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received. Exiting gracefully."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    messaging.shutdown().await;
}
