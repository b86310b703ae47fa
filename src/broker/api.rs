//! Broker client boundary
//!
//! These traits are the seam between the messaging layer and whatever
//! transport actually carries messages. A client creates and fetches topics;
//! a topic publishes and creates/fetches subscriptions; a subscription opens
//! an event stream. `MemoryBroker` is the in-process implementation.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::filter::AttributeFilter;
use crate::broker::message::{Attributes, DeliveryId, EventReceiver};
use crate::utils::error::BrokerError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub filter: Option<AttributeFilter>,
}

#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Creates a topic. Fails with `AlreadyExists` if it is already there.
    async fn create_topic(&self, name: &str) -> Result<Arc<dyn TopicHandle>, BrokerError>;

    /// Fetches a handle to an existing topic.
    async fn topic(&self, name: &str) -> Result<Arc<dyn TopicHandle>, BrokerError>;
}

#[async_trait]
pub trait TopicHandle: Debug + Send + Sync {
    fn name(&self) -> &str;

    async fn publish(
        &self,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<DeliveryId, BrokerError>;

    /// Creates a subscription. Fails with `AlreadyExists` if it is already there.
    async fn create_subscription(
        &self,
        name: &str,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn SubscriptionHandle>, BrokerError>;

    /// Fetches a handle to an existing subscription.
    async fn subscription(&self, name: &str) -> Result<Arc<dyn SubscriptionHandle>, BrokerError>;
}

pub trait SubscriptionHandle: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn topic(&self) -> &str;

    /// Opens a stream of message and error events for this subscription.
    fn listen(&self) -> Result<EventReceiver, BrokerError>;
}
