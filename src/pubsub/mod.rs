//! The `pubsub` module is the caller-facing side of the messaging layer.
//!
//! - `identity`: the instance identity, subscription naming and the sender filter
//! - `publisher`: JSON publish tagged with the sender attribute
//! - `subscriber`: per-instance subscription creation and delivery wiring
//! - `handler`: the handler trait and the context handlers receive

pub mod handler;
pub mod identity;
pub mod publisher;
pub mod subscriber;

pub use handler::{MessageContext, MessageHandler, SharedHandler, handler_fn};
pub use identity::InstanceIdentity;
pub use publisher::Publisher;
pub use subscriber::SubscriptionManager;
