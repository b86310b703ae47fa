use tracing::Subscriber;

/// Builds the fmt subscriber used by the application.
///
/// This uses a simple `with_max_level` configuration based on `default_level`.
pub fn subscriber(default_level: &str) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_max_level(parse_level(default_level))
        .with_target(false)
        .finish()
}

/// Initialize tracing/logging for the application.
///
/// Installing twice is a no-op; the first subscriber stays in place.
pub fn init(default_level: &str) {
    let _ = tracing::subscriber::set_global_default(subscriber(default_level));
}

/// Maps a configured level name to a `tracing::Level`, falling back to `INFO`.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}
