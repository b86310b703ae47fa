//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `pubsub_bridge` crate.
//!
//! It holds the error types shared by every layer and the logging bootstrap.

pub mod error;
pub mod logging;
