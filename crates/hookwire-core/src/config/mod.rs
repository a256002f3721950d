//! Application configuration schemas.
//!
//! Configuration is deserialized via the `config` crate from optional TOML
//! files plus `HOOKWIRE__`-prefixed environment variables. Each sub-module
//! represents one section.

pub mod handler;
pub mod logging;
pub mod runner;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::handler::HandlerConfig;
pub use self::logging::LoggingConfig;
pub use self::runner::RunnerConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hook handler settings.
    #[serde(default)]
    pub handler: HandlerConfig,
    /// Pipeline settings.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for an environment.
    ///
    /// Merges `config/default.toml`, `config/{env}.toml` and environment
    /// variables prefixed with `HOOKWIRE__`. Every file is optional.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from_dir(Path::new("config"), env)
    }

    /// Like [`AppConfig::load`], reading the files from `dir`.
    pub fn load_from_dir(dir: &Path, env: &str) -> Result<Self, AppError> {
        let default = dir.join("default");
        let env_file = dir.join(env);

        let config = config::Config::builder()
            .add_source(canonical_layer(
                config::File::with_name(&default.to_string_lossy()).required(false),
            )?)
            .add_source(canonical_layer(
                config::File::with_name(&env_file.to_string_lossy()).required(false),
            )?)
            .add_source(Self::environment())
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Load configuration from one explicit file, then environment overrides.
    pub fn load_file(path: &Path) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(canonical_layer(config::File::from(path).required(true))?)
            .add_source(Self::environment())
            .build()
            .map_err(|e| {
                AppError::configuration(format!(
                    "Failed to build config from '{}': {e}",
                    path.display()
                ))
            })?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("HOOKWIRE")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("handler.hookfiles")
            .with_list_parse_key("runner.only")
            .with_list_parse_key("runner.method")
            .try_parsing(true)
    }
}

/// Reads one file layer and renames its dashed keys to the field names.
///
/// Renaming happens per layer so that a dashed key in a later file overrides
/// the canonical key of an earlier one.
fn canonical_layer<S>(source: S) -> Result<impl config::Source + Send + Sync + 'static, AppError>
where
    S: config::Source + Send + Sync + 'static,
{
    let mut layer: Value = config::Config::builder()
        .add_source(source)
        .build()
        .map_err(|e| AppError::configuration(format!("Failed to read config file: {e}")))?
        .try_deserialize()
        .map_err(|e| AppError::configuration(format!("Failed to read config file: {e}")))?;

    rename_keys(&mut layer, "handler", &handler::KEY_ALIASES);
    rename_keys(&mut layer, "runner", &runner::KEY_ALIASES);

    Ok(config::File::from_str(
        &layer.to_string(),
        config::FileFormat::Json,
    ))
}

fn rename_keys(layer: &mut Value, section: &str, aliases: &[(&str, &str)]) {
    let Some(Value::Object(table)) = layer.get_mut(section) else {
        return;
    };
    for (alias, key) in aliases {
        if let Some(value) = table.remove(*alias) {
            table.insert((*key).to_string(), value);
        }
    }
}
