//! Message definitions for the broker boundary
//!
//! `InboundMessage` is what a broker client hands to a subscription listener:
//! the raw payload, its attributes, and the capability to acknowledge it.
//!
//! Notes on fields:
//! - `id`: delivery id assigned by the broker at publish time
//! - `data`: raw payload bytes; the messaging layer encodes JSON
//! - `attributes`: string key/value pairs; `sender` is the only reserved key
//! - `publish_time`: milliseconds since UNIX epoch, set by the broker
//! - `delivery_attempt`: 1 for the first delivery, incremented on redelivery

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::utils::error::BrokerError;

/// Attribute key carrying the publishing instance's identity.
pub const SENDER_ATTRIBUTE: &str = "sender";

pub type Attributes = HashMap<String, String>;

/// Identifier the broker returns for an accepted publish.
pub type DeliveryId = String;

/// Receiving side of a subscription's event stream.
pub type EventReceiver = UnboundedReceiver<SubscriptionEvent>;

/// Signals to the broker that a delivered message was processed.
pub trait Acknowledger: Send + Sync {
    fn ack(&self, ack_id: &str);
}

pub struct InboundMessage {
    pub id: String,
    pub data: Vec<u8>,
    pub attributes: Attributes,
    pub publish_time: i64,
    pub delivery_attempt: u32,
    ack_id: String,
    acker: Arc<dyn Acknowledger>,
}

impl InboundMessage {
    pub fn new(
        id: String,
        data: Vec<u8>,
        attributes: Attributes,
        publish_time: i64,
        delivery_attempt: u32,
        ack_id: String,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            id,
            data,
            attributes,
            publish_time,
            delivery_attempt,
            ack_id,
            acker,
        }
    }

    /// The identity of the instance that published this message, if tagged.
    pub fn sender(&self) -> Option<&str> {
        self.attributes.get(SENDER_ATTRIBUTE).map(String::as_str)
    }

    /// Payload as text, lossy for non UTF-8 bytes. Used for logging.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Acknowledges the message. Consumes it so a delivery is acked at most once.
    pub fn ack(self) {
        self.acker.ack(&self.ack_id);
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("id", &self.id)
            .field("data", &self.text())
            .field("attributes", &self.attributes)
            .field("publish_time", &self.publish_time)
            .field("delivery_attempt", &self.delivery_attempt)
            .finish()
    }
}

/// Events emitted on a subscription's stream.
#[derive(Debug)]
pub enum SubscriptionEvent {
    Message(InboundMessage),
    Error(BrokerError),
}
