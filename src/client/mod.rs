//! The `client` module turns connection options into a connected broker client.
//!
//! It provides the `ClientProvider` seam the startup routine acquires its
//! client through, and `CredentialFileProvider`, which stages the credential
//! blob on disk before handing it to a transport `Connector`.

pub mod provider;
pub use provider::{
    CREDENTIALS_FILE_NAME, ClientProvider, ConnectionOptions, Connector, CredentialFileProvider,
    stage_credentials,
};
