//! castscreen configuration.
//!
//! TOML-based configuration for the screen mirroring controller. Every
//! section uses serde defaults, so a partial (or empty) file works.
//!
//! ```rust,no_run
//! use castscreen_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod toml_writer;
pub mod validation;

pub use schema::{
    CastConfig, CastScreenConfig, CaptureConfig, LogLevel, LoggingConfig, NotificationConfig,
    RemoteConfig, RemoteDisplayPreset, CONFIG_SCHEMA_VERSION,
};
pub use toml_writer::{export_config, render_config};

use castscreen_common::ConfigError;

/// Load config from the platform default path and validate it.
pub fn load_config() -> Result<CastScreenConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &CastScreenConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
