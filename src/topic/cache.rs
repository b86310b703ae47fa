//! Topic cache
//!
//! Memoizes topic handles by name. Each name owns a `OnceCell`, so concurrent
//! first access to the same topic performs a single create-or-fetch round
//! trip and every caller receives the same handle. A failed resolution leaves
//! the cell empty; the next caller tries again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::info;

use crate::broker::{BrokerClient, TopicHandle};
use crate::topic::resolution::{Resolution, create_or_fetch};
use crate::utils::error::MessagingError;

type TopicCell = Arc<OnceCell<Arc<dyn TopicHandle>>>;

#[derive(Clone)]
pub struct TopicCache {
    client: Arc<dyn BrokerClient>,
    entries: Arc<Mutex<HashMap<String, TopicCell>>>,
}

impl TopicCache {
    /// Creates an empty cache resolving topics through `client`.
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self {
            client,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The broker client topics are resolved through.
    pub fn client(&self) -> &Arc<dyn BrokerClient> {
        &self.client
    }

    /// Returns the handle for `name`, creating or fetching it on first use.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn TopicHandle>, MessagingError> {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(name.to_string()).or_default().clone()
        };

        let topic = cell
            .get_or_try_init(|| self.resolve(name))
            .await?;
        Ok(Arc::clone(topic))
    }

    async fn resolve(&self, name: &str) -> Result<Arc<dyn TopicHandle>, MessagingError> {
        let resolution = create_or_fetch(self.client.create_topic(name), || {
            self.client.topic(name)
        })
        .await;

        match &resolution {
            Resolution::Created(_) => info!(topic = %name, "topic created"),
            Resolution::Existing(_) => info!(topic = %name, "topic ready (already existed)"),
            Resolution::Failed(_) => {}
        }

        resolution
            .into_result()
            .map_err(|source| MessagingError::TopicResolution {
                topic: name.to_string(),
                source,
            })
    }

    /// Whether `name` has a resolved handle in the cache.
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of resolved topics. Names still resolving or whose last attempt
    /// failed are not counted.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TopicCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicCache")
            .field("client", &"dyn BrokerClient")
            .field("topics", &self.len())
            .finish()
    }
}
