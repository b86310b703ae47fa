//! Publisher
//!
//! Serializes a message to JSON, resolves its topic through the shared cache
//! and publishes it tagged with this instance's `sender` attribute. A single
//! attempt is made; failures go back to the caller.

use serde::Serialize;
use tracing::debug;

use crate::broker::DeliveryId;
use crate::pubsub::identity::InstanceIdentity;
use crate::topic::TopicCache;
use crate::utils::error::MessagingError;

#[derive(Debug, Clone)]
pub struct Publisher {
    cache: TopicCache,
    identity: InstanceIdentity,
}

impl Publisher {
    pub fn new(cache: TopicCache, identity: InstanceIdentity) -> Self {
        Self { cache, identity }
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn cache(&self) -> &TopicCache {
        &self.cache
    }

    pub async fn publish<T>(&self, topic: &str, message: &T) -> Result<DeliveryId, MessagingError>
    where
        T: Serialize + ?Sized + Sync,
    {
        if topic.is_empty() {
            return Err(MessagingError::EmptyTopicName);
        }
        let data = serde_json::to_vec(message)?;
        let handle = self.cache.get(topic).await?;

        let delivery_id = handle
            .publish(data, self.identity.sender_attributes())
            .await
            .map_err(|source| MessagingError::Publish {
                topic: topic.to_string(),
                source,
            })?;

        debug!(topic, delivery_id = %delivery_id, "message published");
        Ok(delivery_id)
    }
}
