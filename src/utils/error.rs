//! The `error` module defines the error types used within `pubsub_bridge`.
//!
//! Broker clients report [`BrokerError`]; the messaging layer wraps those into
//! [`MessagingError`] for callers of publish/subscribe. Errors raised while a
//! single inbound message is processed are [`DeliveryError`]s and never leave
//! the delivery loop.

use std::path::PathBuf;

use thiserror::Error;

/// Error type returned by user message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Failures reported by a broker client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker rejected request: {0}")]
    Rejected(String),

    #[error("subscription stream closed")]
    Closed,
}

/// Failures while turning connection options into a usable client.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("credentials are not valid JSON: {0}")]
    InvalidCredentials(#[source] serde_json::Error),

    #[error("credentials must be a JSON object")]
    CredentialsNotAnObject,

    #[error("failed to stage credentials at {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to broker: {0}")]
    Connect(#[source] BrokerError),
}

/// Both halves of a create-or-fetch attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("create failed ({create}); fetch failed ({fetch})")]
pub struct ResolutionFailure {
    pub create: BrokerError,
    pub fetch: BrokerError,
}

/// Errors surfaced to callers of `publish` and `subscribe`.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("could not resolve topic '{topic}': {source}")]
    TopicResolution {
        topic: String,
        #[source]
        source: ResolutionFailure,
    },

    #[error("could not resolve subscription '{subscription}': {source}")]
    SubscriptionResolution {
        subscription: String,
        #[source]
        source: ResolutionFailure,
    },

    #[error("publish to '{topic}' failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("could not open message stream for '{subscription}': {source}")]
    Listen {
        subscription: String,
        #[source]
        source: BrokerError,
    },

    #[error("topic name must not be empty")]
    EmptyTopicName,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("messaging is unavailable")]
    Unavailable,
}

/// Failures while processing one inbound message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("payload is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Rejected binding declarations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("binding has an empty topic name")]
    EmptyTopic,

    #[error("topic '{0}' is bound more than once")]
    Duplicate(String),
}
