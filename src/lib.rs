//! # pubsub-bridge
//!
//! `pubsub_bridge` lets an independently running service instance take part
//! in a shared publish/subscribe bus without receiving its own messages back.
//! Every instance publishes with a `sender` attribute and owns one
//! subscription per topic, named `<topic>.<instance>`, filtered to exclude
//! that sender.
//!
//! ## Core Modules
//!
//! - `broker`: the broker client boundary and `MemoryBroker`, an in-process implementation.
//! - `client`: acquiring a broker client from connection options and staged credentials.
//! - `config`: loading settings from files and the environment.
//! - `topic`: create-or-fetch resolution and the shared topic cache.
//! - `pubsub`: instance identity, the publisher, the subscription manager and handlers.
//! - `delivery`: the per-subscription decode/dispatch/ack loop.
//! - `service`: declared bindings and the startup routine.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod delivery;
pub mod pubsub;
pub mod service;
pub mod topic;
pub mod utils;

pub use pubsub::{InstanceIdentity, MessageContext, MessageHandler, Publisher, handler_fn};
pub use service::{Bindings, Messaging, MessagingService};

#[cfg(test)]
mod tests;
