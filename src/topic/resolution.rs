//! Create-or-fetch resolution
//!
//! Brokers without a "create if not exists" primitive are driven by trying to
//! create first and fetching on failure. `create_or_fetch` makes both branches
//! explicit so callers can log and test which one was taken.

use std::future::Future;

use crate::utils::error::{BrokerError, ResolutionFailure};

#[derive(Debug)]
pub enum Resolution<T> {
    /// The create call succeeded.
    Created(T),
    /// Creation failed but the existing resource was fetched.
    Existing(T),
    /// Both calls failed.
    Failed(ResolutionFailure),
}

impl<T> Resolution<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, Self::Existing(_))
    }

    pub fn into_result(self) -> Result<T, ResolutionFailure> {
        match self {
            Self::Created(value) | Self::Existing(value) => Ok(value),
            Self::Failed(failure) => Err(failure),
        }
    }
}

/// Awaits `create`; on failure awaits the future built by `fetch`.
pub async fn create_or_fetch<T, C, F, Fut>(create: C, fetch: F) -> Resolution<T>
where
    C: Future<Output = Result<T, BrokerError>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let create_err = match create.await {
        Ok(value) => return Resolution::Created(value),
        Err(err) => err,
    };
    match fetch().await {
        Ok(value) => Resolution::Existing(value),
        Err(fetch_err) => Resolution::Failed(ResolutionFailure {
            create: create_err,
            fetch: fetch_err,
        }),
    }
}
