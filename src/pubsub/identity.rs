use std::fmt;
use std::sync::Arc;

use crate::broker::{AttributeFilter, Attributes, SENDER_ATTRIBUTE};

/// Identity of the running node. Tags outgoing messages and names this
/// node's subscriptions, so it must stay fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity(Arc<str>);

impl InstanceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<topic>.<identity>`: one subscription per topic per instance,
    /// stable across restarts.
    pub fn subscription_name(&self, topic: &str) -> String {
        format!("{topic}.{}", self.0)
    }

    /// Filter that keeps this instance's own messages out of its subscriptions.
    pub fn sender_filter(&self) -> AttributeFilter {
        AttributeFilter::sender_is_not(&self.0)
    }

    pub fn sender_attributes(&self) -> Attributes {
        Attributes::from([(SENDER_ATTRIBUTE.to_string(), self.0.to_string())])
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
