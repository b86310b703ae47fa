//! Service integration: declared bindings and the startup routine that turns
//! them into running subscriptions.

pub mod bindings;
pub mod startup;

pub use bindings::{Binding, Bindings};
pub use startup::{FailedBinding, Messaging, MessagingService, StartupReport};

#[cfg(test)]
mod tests;
