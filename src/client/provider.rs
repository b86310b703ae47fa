use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::broker::{BrokerClient, MemoryBroker};
use crate::utils::error::{BrokerError, ConnectionError};

/// File name the credential blob is staged under inside `temp_folder`.
pub const CREDENTIALS_FILE_NAME: &str = "broker-credentials.json";

/// Options needed to acquire a broker client.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Opaque JSON credential blob.
    pub credentials: String,

    /// Directory the credentials are staged in before connecting.
    pub temp_folder: PathBuf,
}

/// Produces a connected broker client. Called once, at startup.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn acquire(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn BrokerClient>, ConnectionError>;
}

/// Builds a client from a staged credential file.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, key_file: &Path) -> Result<Arc<dyn BrokerClient>, BrokerError>;
}

/// The in-process broker needs no credentials; it hands out a clone of itself.
#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, key_file: &Path) -> Result<Arc<dyn BrokerClient>, BrokerError> {
        debug!(key_file = %key_file.display(), "connecting in-process broker");
        Ok(Arc::new(self.clone()))
    }
}

/// Validates the credential blob and writes it to
/// `<temp_folder>/broker-credentials.json`, creating the folder if needed.
pub async fn stage_credentials(options: &ConnectionOptions) -> Result<PathBuf, ConnectionError> {
    let credentials: serde_json::Value =
        serde_json::from_str(&options.credentials).map_err(ConnectionError::InvalidCredentials)?;
    if !credentials.is_object() {
        return Err(ConnectionError::CredentialsNotAnObject);
    }

    tokio::fs::create_dir_all(&options.temp_folder)
        .await
        .map_err(|source| ConnectionError::Staging {
            path: options.temp_folder.clone(),
            source,
        })?;

    let key_file = options.temp_folder.join(CREDENTIALS_FILE_NAME);
    let contents =
        serde_json::to_vec_pretty(&credentials).map_err(ConnectionError::InvalidCredentials)?;
    tokio::fs::write(&key_file, contents)
        .await
        .map_err(|source| ConnectionError::Staging {
            path: key_file.clone(),
            source,
        })?;

    Ok(key_file)
}

/// Stages credentials on disk, then connects through `C`.
#[derive(Debug, Clone)]
pub struct CredentialFileProvider<C> {
    connector: C,
}

impl<C: Connector> CredentialFileProvider<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<C: Connector> ClientProvider for CredentialFileProvider<C> {
    async fn acquire(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn BrokerClient>, ConnectionError> {
        let result = match stage_credentials(options).await {
            Ok(key_file) => self
                .connector
                .connect(&key_file)
                .await
                .map_err(ConnectionError::Connect),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            error!(error = %err, "get broker client failed");
        }
        result
    }
}
