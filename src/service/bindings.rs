//! Subscription bindings
//!
//! The owning service declares which handler consumes which topic before
//! startup. Bindings are checked once, when the service starts: a binding with
//! an empty topic name or a topic that is already bound is rejected, and the
//! first binding for a topic wins.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::pubsub::{MessageHandler, SharedHandler};
use crate::utils::error::BindingError;

#[derive(Clone)]
pub struct Binding {
    pub topic: String,
    pub handler: SharedHandler,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `topic`.
    pub fn on<H: MessageHandler>(self, topic: impl Into<String>, handler: H) -> Self {
        self.on_shared(topic, Arc::new(handler))
    }

    pub fn on_shared(mut self, topic: impl Into<String>, handler: SharedHandler) -> Self {
        self.entries.push(Binding {
            topic: topic.into(),
            handler,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|b| b.topic.as_str())
    }

    /// Splits the declarations into accepted bindings and rejections.
    pub fn validate(self) -> (Vec<Binding>, Vec<BindingError>) {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for binding in self.entries {
            if binding.topic.is_empty() {
                rejected.push(BindingError::EmptyTopic);
            } else if !seen.insert(binding.topic.clone()) {
                rejected.push(BindingError::Duplicate(binding.topic));
            } else {
                accepted.push(binding);
            }
        }
        (accepted, rejected)
    }
}
