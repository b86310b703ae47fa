//! broker
//!
//! The broker boundary: the client traits the messaging layer talks to, the
//! inbound message and event types, attribute filters, and `MemoryBroker`,
//! an in-process implementation with ack tracking and redelivery.

pub mod api;
pub mod engine;
pub mod filter;
pub mod message;
pub mod topic;

pub use api::{BrokerClient, SubscriptionHandle, SubscriptionOptions, TopicHandle};
pub use engine::MemoryBroker;
pub use filter::AttributeFilter;
pub use message::{
    Attributes, DeliveryId, EventReceiver, InboundMessage, SENDER_ATTRIBUTE, SubscriptionEvent,
};
