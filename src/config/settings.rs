use std::path::PathBuf;

use serde::Deserialize;

use crate::client::ConnectionOptions;

/// Top-level configuration settings for the application.
///
/// Includes settings for the messaging layer and for logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub messaging: MessagingSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the messaging layer.
///
/// `instance_id` is the identity this node tags its messages with and uses
/// to name its subscriptions.
#[derive(Debug, Deserialize, Clone)]
pub struct MessagingSettings {
    pub instance_id: String,
    pub credentials: String,
    pub temp_folder: PathBuf,
    pub ack_deadline_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub messaging: Option<PartialMessagingSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialMessagingSettings {
    pub instance_id: Option<String>,
    pub credentials: Option<String>,
    pub temp_folder: Option<PathBuf>,
    pub ack_deadline_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Connection options handed to the client provider at startup.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            credentials: self.messaging.credentials.clone(),
            temp_folder: self.messaging.temp_folder.clone(),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            messaging: MessagingSettings {
                instance_id: "SAMPLE-PUBSUB".to_string(),
                credentials: "{}".to_string(),
                temp_folder: std::env::temp_dir().join("pubsub-bridge"),
                ack_deadline_ms: 10_000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
