//! Inbound delivery: the per-subscription consumption loop and its counters.

pub mod pipeline;
pub mod stats;

pub use pipeline::{ActiveSubscription, Route, process_message};
pub use stats::{DeliveryStats, StatsSnapshot};

#[cfg(test)]
mod tests;
