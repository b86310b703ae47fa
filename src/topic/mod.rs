//! Topic resolution: the create-or-fetch resolver and the shared topic cache.

pub mod cache;
pub mod resolution;

pub use cache::TopicCache;
pub use resolution::{Resolution, create_or_fetch};
