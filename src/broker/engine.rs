//! In-process broker engine
//!
//! `MemoryBroker` implements the broker client boundary without a network:
//! - managing topics and the subscriptions attached to them
//! - fanning published messages out to every subscription whose filter accepts them
//! - tracking delivered-but-unacknowledged messages and redelivering them
//!   once their ack deadline lapses
//! - holding a bounded backlog for subscriptions that have no live listener yet
//!
//! Concurrency and usage notes:
//! - All state sits behind one `std::sync::Mutex`; it is never held across an
//!   `.await`, so the async trait methods are effectively synchronous.
//! - The redelivery loop is designed to be run as a background task. Redelivery
//!   is capped at `MAX_REDELIVERIES` to avoid infinite resend loops.
//! - Backlogs hold at most `backlog_limit` messages; the oldest is dropped first.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::api::{BrokerClient, SubscriptionOptions, TopicHandle};
use crate::broker::filter::AttributeFilter;
use crate::broker::message::{
    Acknowledger, Attributes, DeliveryId, InboundMessage, SubscriptionEvent,
};
use crate::broker::topic::{MemoryTopic, SubscriptionState, TopicState};
use crate::utils::error::BrokerError;

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub data: Vec<u8>,
    pub attributes: Attributes,
    pub publish_time: i64,
}

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub message: StoredMessage,
    pub subscription: String,
    pub sent_at: Instant,
    pub retries: u8,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
    subscriptions: HashMap<String, SubscriptionState>,
    pending_acks: HashMap<String, PendingMessage>,
    acks: HashMap<String, usize>,
    topic_creates: HashMap<String, usize>,
    topic_fetches: HashMap<String, usize>,
    failing_topics: HashSet<String>,
    failing_subscriptions: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    ack_deadline: Duration,
    backlog_limit: usize,
}

impl MemoryBroker {
    /// Maximum number of redeliveries for an unacknowledged message before dropping.
    pub const MAX_REDELIVERIES: u8 = 5;

    /// Ack deadline used by `new()`.
    pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(10);

    /// Backlog size per subscription used by `new()`.
    pub const DEFAULT_BACKLOG_LIMIT: usize = 10_000;

    const REDELIVERY_TICK: Duration = Duration::from_millis(1000);
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty broker with the default ack deadline and backlog limit.
    pub fn new() -> Self {
        Self::with_ack_deadline(Self::DEFAULT_ACK_DEADLINE)
    }

    /// Creates an empty broker that redelivers unacked messages after `ack_deadline`.
    pub fn with_ack_deadline(ack_deadline: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            ack_deadline,
            backlog_limit: Self::DEFAULT_BACKLOG_LIMIT,
        }
    }

    /// Caps how many messages a listener-less subscription keeps. A limit of
    /// zero is raised to one.
    pub fn with_backlog_limit(mut self, limit: usize) -> Self {
        self.backlog_limit = limit.max(1);
        self
    }

    pub fn ack_deadline(&self) -> Duration {
        self.ack_deadline
    }

    pub fn backlog_limit(&self) -> usize {
        self.backlog_limit
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ack_id(subscription: &str, message_id: &str) -> String {
        format!("{subscription}/{message_id}")
    }

    /// Stores a message on `topic` and fans it out to every subscription whose
    /// filter accepts `attributes`. Returns the broker-assigned message id.
    pub(crate) fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        attributes: Attributes,
    ) -> Result<DeliveryId, BrokerError> {
        let mut state = self.lock();
        let subscriptions: Vec<String> = match state.topics.get(topic) {
            Some(t) => t.subscriptions.iter().cloned().collect(),
            None => {
                return Err(BrokerError::NotFound {
                    kind: "topic",
                    name: topic.to_string(),
                });
            }
        };

        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            data,
            attributes,
            publish_time: chrono::Utc::now().timestamp_millis(),
        };

        for name in subscriptions {
            let accepted = state
                .subscriptions
                .get(&name)
                .is_some_and(|sub| sub.accepts(&message.attributes));
            if accepted {
                self.dispatch(&mut state, &name, message.clone(), 0);
            } else {
                debug!(subscription = %name, message_id = %message.id, "message filtered out");
            }
        }

        Ok(message.id)
    }

    /// Hands a message to the next live listener of `subscription` and marks it
    /// pending, or parks it in the backlog when nobody is listening.
    fn dispatch(
        &self,
        state: &mut BrokerState,
        subscription: &str,
        message: StoredMessage,
        retries: u8,
    ) {
        let Some(sub) = state.subscriptions.get_mut(subscription) else {
            return;
        };
        let ack_id = Self::ack_id(subscription, &message.id);

        let Some(listener) = sub.next_listener() else {
            self.park(sub, message);
            state.pending_acks.remove(&ack_id);
            return;
        };

        let inbound = InboundMessage::new(
            message.id.clone(),
            message.data.clone(),
            message.attributes.clone(),
            message.publish_time,
            u32::from(retries) + 1,
            ack_id.clone(),
            Arc::new(self.clone()),
        );

        if listener.send(SubscriptionEvent::Message(inbound)).is_err() {
            self.park(sub, message);
            state.pending_acks.remove(&ack_id);
            return;
        }

        state.pending_acks.insert(
            ack_id,
            PendingMessage {
                message,
                subscription: subscription.to_string(),
                sent_at: Instant::now(),
                retries,
            },
        );
    }

    fn park(&self, sub: &mut SubscriptionState, message: StoredMessage) {
        if let Some(evicted) = sub.park(message, self.backlog_limit) {
            warn!(
                subscription = %sub.name,
                message_id = %evicted.id,
                limit = self.backlog_limit,
                "backlog full; oldest message dropped"
            );
        }
    }

    /// Creates subscription `name` on `topic` with the given filter.
    /// Fails with `AlreadyExists` if the name is taken.
    pub(crate) fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        options: SubscriptionOptions,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        if state.failing_subscriptions.contains(name) {
            return Err(BrokerError::Unavailable(format!(
                "subscription '{name}' is failing"
            )));
        }
        if state.subscriptions.contains_key(name) {
            return Err(BrokerError::AlreadyExists {
                kind: "subscription",
                name: name.to_string(),
            });
        }
        let Some(topic_state) = state.topics.get_mut(topic) else {
            return Err(BrokerError::NotFound {
                kind: "topic",
                name: topic.to_string(),
            });
        };
        topic_state.attach(name);
        state
            .subscriptions
            .insert(name.to_string(), SubscriptionState::new(name, topic, options));
        Ok(())
    }

    /// Returns the topic an existing subscription is attached to.
    pub(crate) fn existing_subscription(&self, name: &str) -> Result<String, BrokerError> {
        let state = self.lock();
        if state.failing_subscriptions.contains(name) {
            return Err(BrokerError::Unavailable(format!(
                "subscription '{name}' is failing"
            )));
        }
        state
            .subscriptions
            .get(name)
            .map(|sub| sub.topic.clone())
            .ok_or_else(|| BrokerError::NotFound {
                kind: "subscription",
                name: name.to_string(),
            })
    }

    /// Registers a listener on `subscription` and flushes its backlog to it.
    pub(crate) fn attach_listener(
        &self,
        subscription: &str,
        listener: UnboundedSender<SubscriptionEvent>,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        let backlog = match state.subscriptions.get_mut(subscription) {
            Some(sub) => {
                sub.listeners.push(listener);
                std::mem::take(&mut sub.backlog)
            }
            None => {
                return Err(BrokerError::NotFound {
                    kind: "subscription",
                    name: subscription.to_string(),
                });
            }
        };
        for message in backlog {
            self.dispatch(&mut state, subscription, message, 0);
        }
        Ok(())
    }

    /// Redelivers every pending message whose ack deadline has lapsed and
    /// drops those that exhausted their redeliveries. Returns how many were resent.
    pub fn redeliver_expired(&self) -> usize {
        let mut state = self.lock();
        let mut to_resend = Vec::new();
        let mut to_drop = Vec::new();

        for (ack_id, pending) in &state.pending_acks {
            if pending.sent_at.elapsed() >= self.ack_deadline {
                if pending.retries >= Self::MAX_REDELIVERIES {
                    to_drop.push(ack_id.clone());
                } else {
                    to_resend.push(ack_id.clone());
                }
            }
        }

        for ack_id in to_drop {
            if let Some(pending) = state.pending_acks.remove(&ack_id) {
                warn!(
                    subscription = %pending.subscription,
                    message_id = %pending.message.id,
                    "message dropped after {} redeliveries",
                    Self::MAX_REDELIVERIES
                );
            }
        }

        let resent = to_resend.len();
        for ack_id in to_resend {
            if let Some(pending) = state.pending_acks.remove(&ack_id) {
                debug!(
                    subscription = %pending.subscription,
                    message_id = %pending.message.id,
                    attempt = pending.retries + 2,
                    "redelivering message"
                );
                self.dispatch(
                    &mut state,
                    &pending.subscription,
                    pending.message,
                    pending.retries + 1,
                );
            }
        }
        resent
    }

    /// Runs `redeliver_expired` once per tick, forever.
    pub async fn start_redelivery_loop(broker: MemoryBroker) {
        loop {
            tokio::time::sleep(Self::REDELIVERY_TICK).await;
            broker.redeliver_expired();
        }
    }

    /// Makes both creation and lookup of `topic` fail with `Unavailable`.
    pub fn fail_topic(&self, topic: &str) {
        self.lock().failing_topics.insert(topic.to_string());
    }

    /// Makes both creation and lookup of `subscription` fail with `Unavailable`.
    pub fn fail_subscription(&self, subscription: &str) {
        self.lock()
            .failing_subscriptions
            .insert(subscription.to_string());
    }

    /// Pushes a stream-level error to every live listener of `subscription`.
    pub fn emit_stream_error(&self, subscription: &str, error: BrokerError) -> usize {
        let mut state = self.lock();
        let Some(sub) = state.subscriptions.get_mut(subscription) else {
            return 0;
        };
        sub.listeners.retain(|listener| !listener.is_closed());
        sub.listeners
            .iter()
            .filter(|listener| {
                listener
                    .send(SubscriptionEvent::Error(error.clone()))
                    .is_ok()
            })
            .count()
    }

    /// Number of `create_topic` calls seen for `topic`, including failed ones.
    pub fn topic_create_calls(&self, topic: &str) -> usize {
        self.lock().topic_creates.get(topic).copied().unwrap_or(0)
    }

    /// Number of `topic` lookups seen for `topic`, including failed ones.
    pub fn topic_fetch_calls(&self, topic: &str) -> usize {
        self.lock().topic_fetches.get(topic).copied().unwrap_or(0)
    }

    /// Number of deliveries acknowledged on `subscription`.
    pub fn ack_count(&self, subscription: &str) -> usize {
        self.lock().acks.get(subscription).copied().unwrap_or(0)
    }

    /// Deliveries handed out but not yet acknowledged, across all subscriptions.
    pub fn pending_count(&self) -> usize {
        self.lock().pending_acks.len()
    }

    /// Messages waiting for a listener on `subscription`.
    pub fn backlog_len(&self, subscription: &str) -> usize {
        self.lock()
            .subscriptions
            .get(subscription)
            .map_or(0, |sub| sub.backlog.len())
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.lock().topics.contains_key(topic)
    }

    pub fn has_subscription(&self, subscription: &str) -> bool {
        self.lock().subscriptions.contains_key(subscription)
    }

    /// The filter `subscription` was created with, if any.
    pub fn subscription_filter(&self, subscription: &str) -> Option<AttributeFilter> {
        self.lock()
            .subscriptions
            .get(subscription)
            .and_then(|sub| sub.filter.clone())
    }
}

impl Acknowledger for MemoryBroker {
    fn ack(&self, ack_id: &str) {
        let mut state = self.lock();
        match state.pending_acks.remove(ack_id) {
            Some(pending) => {
                *state.acks.entry(pending.subscription).or_insert(0) += 1;
            }
            None => debug!(ack_id, "ack for unknown or expired delivery"),
        }
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn create_topic(&self, name: &str) -> Result<Arc<dyn TopicHandle>, BrokerError> {
        let mut state = self.lock();
        *state.topic_creates.entry(name.to_string()).or_insert(0) += 1;
        if state.failing_topics.contains(name) {
            return Err(BrokerError::Unavailable(format!("topic '{name}' is failing")));
        }
        if state.topics.contains_key(name) {
            return Err(BrokerError::AlreadyExists {
                kind: "topic",
                name: name.to_string(),
            });
        }
        state.topics.insert(name.to_string(), TopicState::new(name));
        Ok(Arc::new(MemoryTopic::new(name, self.clone())))
    }

    async fn topic(&self, name: &str) -> Result<Arc<dyn TopicHandle>, BrokerError> {
        let mut state = self.lock();
        *state.topic_fetches.entry(name.to_string()).or_insert(0) += 1;
        if state.failing_topics.contains(name) {
            return Err(BrokerError::Unavailable(format!("topic '{name}' is failing")));
        }
        if !state.topics.contains_key(name) {
            return Err(BrokerError::NotFound {
                kind: "topic",
                name: name.to_string(),
            });
        }
        Ok(Arc::new(MemoryTopic::new(name, self.clone())))
    }
}
