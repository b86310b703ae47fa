//! Subscription-side attribute filters.

use std::fmt;

use crate::broker::message::{Attributes, SENDER_ATTRIBUTE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeFilter {
    /// Passes messages whose attribute `key` is absent or differs from `value`.
    NotEquals { key: String, value: String },
}

impl AttributeFilter {
    /// Excludes messages published by `identity`.
    pub fn sender_is_not(identity: &str) -> Self {
        Self::NotEquals {
            key: SENDER_ATTRIBUTE.to_string(),
            value: identity.to_string(),
        }
    }

    /// Renders the filter in the broker's expression syntax,
    /// e.g. `attributes.sender != "node-1"`.
    pub fn expression(&self) -> String {
        match self {
            Self::NotEquals { key, value } => {
                format!("attributes.{key} != \"{}\"", value.replace('"', "\\\""))
            }
        }
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Self::NotEquals { key, value } => attributes.get(key) != Some(value),
        }
    }
}

impl fmt::Display for AttributeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}
