use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::broker::{Attributes, SENDER_ATTRIBUTE};
use crate::pubsub::publisher::Publisher;
use crate::utils::error::HandlerError;

/// What a handler sees for one inbound message.
#[derive(Debug, Clone)]
pub struct MessageContext {
    /// The decoded JSON payload.
    pub params: Value,
    pub topic: String,
    pub subscription: String,
    pub message_id: String,
    pub attributes: Attributes,
    pub publish_time: i64,
    pub delivery_attempt: u32,
    /// Publishes as this instance; lets handlers emit follow-up messages.
    pub publisher: Publisher,
}

impl MessageContext {
    /// Deserializes `params` into a typed value.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.params)
    }

    pub fn sender(&self) -> Option<&str> {
        self.attributes.get(SENDER_ATTRIBUTE).map(String::as_str)
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: MessageContext) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: MessageContext) -> Result<(), HandlerError> {
        (self)(ctx).await
    }
}

pub type SharedHandler = Arc<dyn MessageHandler>;

/// Wraps a closure as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(f)
}
