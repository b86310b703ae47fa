mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{LoggingSettings, MessagingSettings, Settings};

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the messaging and logging configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("BRIDGE")
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();
    let messaging = partial.messaging;
    let logging = partial.logging;

    Ok(Settings {
        messaging: MessagingSettings {
            instance_id: messaging
                .as_ref()
                .and_then(|m| m.instance_id.clone())
                .unwrap_or(default.messaging.instance_id),
            credentials: messaging
                .as_ref()
                .and_then(|m| m.credentials.clone())
                .unwrap_or(default.messaging.credentials),
            temp_folder: messaging
                .as_ref()
                .and_then(|m| m.temp_folder.clone())
                .unwrap_or(default.messaging.temp_folder),
            ack_deadline_ms: messaging
                .as_ref()
                .and_then(|m| m.ack_deadline_ms)
                .unwrap_or(default.messaging.ack_deadline_ms),
        },
        logging: LoggingSettings {
            level: logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}
