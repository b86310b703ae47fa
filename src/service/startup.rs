//! Startup orchestration
//!
//! `MessagingService::start` acquires the broker client, then establishes one
//! subscription per declared binding. All bindings are established
//! concurrently and startup waits for every one of them to settle. Nothing
//! here fails the host: a client that cannot be acquired leaves messaging
//! degraded, and a binding that cannot be established is logged and skipped.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};

use crate::broker::{BrokerClient, DeliveryId};
use crate::client::{ClientProvider, ConnectionOptions};
use crate::config::Settings;
use crate::delivery::ActiveSubscription;
use crate::pubsub::{InstanceIdentity, Publisher, SharedHandler, SubscriptionManager};
use crate::service::bindings::Bindings;
use crate::topic::TopicCache;
use crate::utils::error::{BindingError, MessagingError};

/// A binding whose subscription could not be established.
#[derive(Debug)]
pub struct FailedBinding {
    pub topic: String,
    pub error: MessagingError,
}

/// What happened during startup.
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Names of the subscriptions that are delivering.
    pub active: Vec<String>,
    pub failed: Vec<FailedBinding>,
    pub rejected: Vec<BindingError>,
    /// Set when the broker client could not be acquired.
    pub connection_error: Option<MessagingError>,
}

pub struct MessagingService<P> {
    provider: P,
    options: ConnectionOptions,
    identity: InstanceIdentity,
    bindings: Bindings,
}

impl<P: ClientProvider> MessagingService<P> {
    pub fn new(
        provider: P,
        options: ConnectionOptions,
        identity: InstanceIdentity,
        bindings: Bindings,
    ) -> Self {
        Self {
            provider,
            options,
            identity,
            bindings,
        }
    }

    pub fn from_settings(provider: P, settings: &Settings, bindings: Bindings) -> Self {
        Self::new(
            provider,
            settings.connection_options(),
            InstanceIdentity::new(settings.messaging.instance_id.clone()),
            bindings,
        )
    }

    pub async fn start(self) -> Messaging {
        match self.provider.acquire(&self.options).await {
            Ok(client) => Messaging::connect(client, self.identity, self.bindings).await,
            Err(err) => {
                error!(
                    instance = %self.identity,
                    error = %err,
                    "start with broker failed; messaging disabled"
                );
                Messaging::degraded(MessagingError::from(err))
            }
        }
    }
}

struct Ready {
    manager: SubscriptionManager,
    subscriptions: Vec<ActiveSubscription>,
}

/// The messaging subsystem of a started service.
pub struct Messaging {
    ready: Option<Ready>,
    report: StartupReport,
}

impl Messaging {
    /// Establishes every accepted binding over `client` and waits for all of them.
    pub async fn connect(
        client: Arc<dyn BrokerClient>,
        identity: InstanceIdentity,
        bindings: Bindings,
    ) -> Self {
        let publisher = Publisher::new(TopicCache::new(client), identity);
        let manager = SubscriptionManager::new(publisher);

        let (accepted, rejected) = bindings.validate();
        for err in &rejected {
            error!(error = %err, "binding rejected");
        }

        let attempts = accepted.into_iter().map(|binding| {
            let manager = manager.clone();
            async move {
                let result = manager.subscribe(&binding.topic, binding.handler).await;
                (binding.topic, result)
            }
        });

        let mut report = StartupReport {
            rejected,
            ..StartupReport::default()
        };
        let mut subscriptions = Vec::new();
        for (topic, result) in join_all(attempts).await {
            match result {
                Ok(active) => {
                    report.active.push(active.name().to_string());
                    subscriptions.push(active);
                }
                Err(error) => {
                    error!(topic = %topic, error = %error, "subscribe failed");
                    report.failed.push(FailedBinding { topic, error });
                }
            }
        }

        info!(
            instance = %manager.identity(),
            active = report.active.len(),
            failed = report.failed.len(),
            "messaging started"
        );

        Self {
            ready: Some(Ready {
                manager,
                subscriptions,
            }),
            report,
        }
    }

    fn degraded(err: MessagingError) -> Self {
        Self {
            ready: None,
            report: StartupReport {
                connection_error: Some(err),
                ..StartupReport::default()
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.ready.is_none()
    }

    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    pub fn identity(&self) -> Option<&InstanceIdentity> {
        self.ready.as_ref().map(|r| r.manager.identity())
    }

    pub fn publisher(&self) -> Option<&Publisher> {
        self.ready.as_ref().map(|r| r.manager.publisher())
    }

    pub fn subscriptions(&self) -> &[ActiveSubscription] {
        self.ready
            .as_ref()
            .map(|r| r.subscriptions.as_slice())
            .unwrap_or(&[])
    }

    fn ready(&self) -> Result<&Ready, MessagingError> {
        self.ready.as_ref().ok_or(MessagingError::Unavailable)
    }

    /// Publishes `message` to `topic` as this instance.
    pub async fn publish<T>(&self, topic: &str, message: &T) -> Result<DeliveryId, MessagingError>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.ready()?.manager.publisher().publish(topic, message).await
    }

    /// Subscribes outside of startup. Errors go to the caller.
    pub async fn subscribe(
        &mut self,
        topic: &str,
        handler: SharedHandler,
    ) -> Result<&ActiveSubscription, MessagingError> {
        let manager = self.ready()?.manager.clone();
        let active = manager.subscribe(topic, handler).await?;

        let ready = self.ready.as_mut().ok_or(MessagingError::Unavailable)?;
        ready.subscriptions.push(active);
        ready
            .subscriptions
            .last()
            .ok_or(MessagingError::Unavailable)
    }

    /// Stops every delivery loop.
    pub async fn shutdown(self) {
        if let Some(ready) = self.ready {
            join_all(ready.subscriptions.into_iter().map(ActiveSubscription::shutdown)).await;
        }
    }
}
