//! The `config` module loads the settings of a load-test run.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `config/default.toml` (or the file given on the command line), and
//! environment variables such as `MQTTLOAD_BROKER__HOST`.

mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, LoadSettings, LogSettings, ReconnectSettings, Settings, TlsSettings,
    TrackerSettings,
};

/// Prefix of environment overrides; sections and keys are split by `__`.
pub const ENV_PREFIX: &str = "MQTTLOAD";

const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Loads the configuration from the default file and environment variables,
/// merged over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like [`load_config`], reading `path` instead of `config/default`. An
/// explicitly named file must exist.
pub fn load_config_from(path: Option<&str>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // Try to deserialize what is available, then merge with defaults
    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
