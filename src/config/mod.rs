mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    DEFAULT_HUB_NAME, LogSettings, PublisherSettings, ServerSettings, Settings,
};

/// Loads the configuration from the default file and environment variables.
///
/// Sources, lowest precedence first:
/// - `config/default.toml` (optional)
/// - a `.env` file in the working directory (optional, via `dotenvy`)
/// - `DESKHUB_`-prefixed environment variables, with `__` separating
///   sections from keys (e.g. `DESKHUB_PUBLISHER__HUB_URL`)
///
/// Missing values are filled from `Settings::default()`. The hub endpoint is
/// not validated here; see [`Settings::hub_endpoint`].
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("DESKHUB")
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}

#[cfg(test)]
mod tests;
