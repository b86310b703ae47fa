//! Subscription manager
//!
//! Derives this instance's subscription name for a topic, creates the
//! subscription with a sender-exclusion filter (or reuses it if it already
//! exists), and spawns the delivery loop that feeds the bound handler.
//! `subscribe` returns as soon as the loop is running; it never waits for traffic.

use tracing::info;

use crate::broker::SubscriptionOptions;
use crate::delivery::{ActiveSubscription, Route};
use crate::pubsub::handler::SharedHandler;
use crate::pubsub::identity::InstanceIdentity;
use crate::pubsub::publisher::Publisher;
use crate::topic::{Resolution, TopicCache, create_or_fetch};
use crate::utils::error::MessagingError;

#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    publisher: Publisher,
}

impl SubscriptionManager {
    /// The manager shares `publisher`'s topic cache and identity.
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn identity(&self) -> &InstanceIdentity {
        self.publisher.identity()
    }

    fn cache(&self) -> &TopicCache {
        self.publisher.cache()
    }

    pub fn subscription_name(&self, topic: &str) -> String {
        self.identity().subscription_name(topic)
    }

    pub async fn subscribe(
        &self,
        topic: &str,
        handler: SharedHandler,
    ) -> Result<ActiveSubscription, MessagingError> {
        if topic.is_empty() {
            return Err(MessagingError::EmptyTopicName);
        }
        let name = self.subscription_name(topic);
        let handle = self.cache().get(topic).await?;

        let options = SubscriptionOptions {
            filter: Some(self.identity().sender_filter()),
        };
        let resolution = create_or_fetch(handle.create_subscription(&name, options), || {
            handle.subscription(&name)
        })
        .await;

        match &resolution {
            Resolution::Created(_) => info!(subscription = %name, "subscription created"),
            Resolution::Existing(_) => {
                info!(subscription = %name, "subscription ready (already existed)")
            }
            Resolution::Failed(_) => {}
        }

        let subscription =
            resolution
                .into_result()
                .map_err(|source| MessagingError::SubscriptionResolution {
                    subscription: name.clone(),
                    source,
                })?;

        let events = subscription
            .listen()
            .map_err(|source| MessagingError::Listen {
                subscription: name.clone(),
                source,
            })?;

        let route = Route {
            topic: topic.to_string(),
            subscription: name,
            publisher: self.publisher.clone(),
        };
        Ok(ActiveSubscription::spawn(route, events, handler))
    }
}
