//! Topic and subscription state for the in-process broker
//!
//! A `TopicState` holds the names of the subscriptions attached to it; a
//! `SubscriptionState` holds its filter, live listeners and the backlog of
//! messages that arrived while nobody was listening.
//!
//! Concurrency note: both are only touched while the broker lock is held.
//! `MemoryTopic` and `MemorySubscription` are the handles given out to
//! callers; they carry a broker clone and re-enter the lock per call.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::broker::api::{SubscriptionHandle, SubscriptionOptions, TopicHandle};
use crate::broker::engine::{MemoryBroker, StoredMessage};
use crate::broker::filter::AttributeFilter;
use crate::broker::message::{Attributes, DeliveryId, EventReceiver, SubscriptionEvent};
use crate::utils::error::BrokerError;

#[derive(Debug, Default)]
pub struct TopicState {
    pub name: String,
    pub subscriptions: HashSet<String>,
}

impl TopicState {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: HashSet::new(),
        }
    }

    /// Attach a subscription to the topic. Duplicate attaches are ignored.
    pub fn attach(&mut self, subscription: &str) {
        self.subscriptions.insert(subscription.to_string());
    }
}

#[derive(Debug)]
pub struct SubscriptionState {
    pub name: String,
    pub topic: String,
    pub filter: Option<AttributeFilter>,
    pub listeners: Vec<UnboundedSender<SubscriptionEvent>>,
    pub backlog: VecDeque<StoredMessage>,
    next_listener: usize,
}

impl SubscriptionState {
    pub fn new(name: &str, topic: &str, options: SubscriptionOptions) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            filter: options.filter,
            listeners: Vec::new(),
            backlog: VecDeque::new(),
            next_listener: 0,
        }
    }

    pub fn accepts(&self, attributes: &Attributes) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.matches(attributes))
    }

    /// Appends `message` to the backlog, evicting and returning the oldest
    /// entry once `limit` messages are already held.
    pub fn park(&mut self, message: StoredMessage, limit: usize) -> Option<StoredMessage> {
        let evicted = if self.backlog.len() >= limit {
            self.backlog.pop_front()
        } else {
            None
        };
        self.backlog.push_back(message);
        evicted
    }

    /// Picks the next live listener in round-robin order, pruning closed ones.
    pub fn next_listener(&mut self) -> Option<UnboundedSender<SubscriptionEvent>> {
        self.listeners.retain(|listener| !listener.is_closed());
        if self.listeners.is_empty() {
            return None;
        }
        let index = self.next_listener % self.listeners.len();
        self.next_listener = self.next_listener.wrapping_add(1);
        Some(self.listeners[index].clone())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTopic {
    name: String,
    broker: MemoryBroker,
}

impl MemoryTopic {
    pub(crate) fn new(name: &str, broker: MemoryBroker) -> Self {
        Self {
            name: name.to_string(),
            broker,
        }
    }
}

#[async_trait]
impl TopicHandle for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(
        &self,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<DeliveryId, BrokerError> {
        self.broker.publish(&self.name, data, attributes)
    }

    async fn create_subscription(
        &self,
        name: &str,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn SubscriptionHandle>, BrokerError> {
        self.broker.create_subscription(&self.name, name, options)?;
        Ok(Arc::new(MemorySubscription::new(
            name,
            &self.name,
            self.broker.clone(),
        )))
    }

    async fn subscription(&self, name: &str) -> Result<Arc<dyn SubscriptionHandle>, BrokerError> {
        let topic = self.broker.existing_subscription(name)?;
        Ok(Arc::new(MemorySubscription::new(
            name,
            &topic,
            self.broker.clone(),
        )))
    }
}

#[derive(Debug, Clone)]
pub struct MemorySubscription {
    name: String,
    topic: String,
    broker: MemoryBroker,
}

impl MemorySubscription {
    pub(crate) fn new(name: &str, topic: &str, broker: MemoryBroker) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            broker,
        }
    }
}

impl SubscriptionHandle for MemorySubscription {
    fn name(&self) -> &str {
        &self.name
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn listen(&self) -> Result<EventReceiver, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.broker.attach_listener(&self.name, tx)?;
        Ok(rx)
    }
}
