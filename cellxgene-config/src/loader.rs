//! Default configuration resource, and loading with file and environment overrides

use crate::app::AppConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::layer::OptionMapping;
use crate::tree::{ConfigOptions, OptionPath};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Environment variable naming the directory that holds the default config
pub const PROJECT_ROOT_ENV: &str = "PROJECT_ROOT";

/// File name of the default configuration under the project root
pub const DEFAULT_CONFIG_FILE: &str = "default_config.yml";

const PACKAGED_DEFAULT_CONFIG: &str = include_str!("../default_config.yml");

/// The baseline configuration every other layer is seeded from
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultConfig {
    server: Value,
    dataset: Value,
}

impl DefaultConfig {
    /// Read `$PROJECT_ROOT/default_config.yml`, or the packaged copy when
    /// `PROJECT_ROOT` is not set
    pub fn load() -> ConfigResult<Self> {
        match std::env::var_os(PROJECT_ROOT_ENV) {
            Some(root) => Self::from_file(Path::new(&root).join(DEFAULT_CONFIG_FILE)),
            None => Self::packaged(),
        }
    }

    /// The default configuration compiled into this crate
    pub fn packaged() -> ConfigResult<Self> {
        Self::from_yaml_str(PACKAGED_DEFAULT_CONFIG)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        log::debug!("Reading default configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        let Some(root) = root.as_mapping() else {
            return Err(ConfigError::ValidationError(
                "default configuration must be a mapping with 'server' and 'dataset' sections"
                    .to_string(),
            ));
        };

        Ok(Self {
            server: Self::section(root, "server")?,
            dataset: Self::section(root, "dataset")?,
        })
    }

    fn section(root: &Mapping, name: &str) -> ConfigResult<Value> {
        match root.get(name) {
            Some(section) if section.is_mapping() => Ok(section.clone()),
            Some(_) => Err(ConfigError::ValidationError(format!(
                "default configuration section '{}' must be a mapping",
                name
            ))),
            None => Err(ConfigError::ValidationError(format!(
                "default configuration has no '{}' section",
                name
            ))),
        }
    }

    pub fn server(&self) -> &Value {
        &self.server
    }

    pub fn dataset(&self) -> &Value {
        &self.dataset
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "CXG".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Build an application config from the default config, an optional user
    /// config file and environment overrides. The result still has to be completed.
    pub fn load(&self, config_path: Option<&Path>) -> ConfigResult<AppConfig> {
        let mut config = AppConfig::new()?;

        if let Some(path) = config_path {
            log::info!("Loading configuration file {}", path.display());
            config.update_from_config_file(path)?;
        }

        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Apply `<PREFIX>_SERVER__<GROUP>__<OPTION>` and `<PREFIX>_DATASET__...`
    /// variables. Option names match case-insensitively. Values are YAML
    /// scalars, except that string options take the raw text.
    pub fn apply_env_overrides(&self, config: &mut AppConfig) -> ConfigResult<()> {
        let server_prefix = format!("{}_SERVER__", self.prefix);
        let dataset_prefix = format!("{}_DATASET__", self.prefix);

        let mut vars: Vec<(String, String)> = std::env::vars().collect();
        vars.sort();

        let server_options = config.server_options();
        let dataset_options = config.dataset_options();

        let mut server = ConfigOptions::new();
        let mut dataset = ConfigOptions::new();
        for (key, raw) in vars {
            if let Some(name) = key.strip_prefix(&server_prefix) {
                let (path, default) = resolve_option(&server_options, name, &key)?;
                let value = typed_env_value(&raw, default, |value| {
                    let options = single_option(path, value);
                    config.clone().update_server_config(&options).is_ok()
                });
                server.insert(path.clone(), value);
            } else if let Some(name) = key.strip_prefix(&dataset_prefix) {
                let (path, default) = resolve_option(&dataset_options, name, &key)?;
                let value = typed_env_value(&raw, default, |value| {
                    let options = single_option(path, value);
                    config.clone().update_default_dataset_config(&options).is_ok()
                });
                dataset.insert(path.clone(), value);
            }
        }

        if !server.is_empty() {
            log::debug!("Applying {} server option(s) from the environment", server.len());
            config.update_server_config(&server)?;
        }
        if !dataset.is_empty() {
            log::debug!("Applying {} dataset option(s) from the environment", dataset.len());
            config.update_default_dataset_config(&dataset)?;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_option<'a>(
    options: &'a OptionMapping,
    name: &str,
    variable: &str,
) -> ConfigResult<(&'a OptionPath, &'a Value)> {
    options
        .iter()
        .find(|(option, _)| option.eq_ignore_ascii_case(name))
        .map(|(_, (path, default))| (path, default))
        .ok_or_else(|| ConfigError::UnknownOption {
            context: format!("environment variable {}", variable),
            name: name.to_string(),
        })
}

fn single_option(path: &OptionPath, value: &Value) -> ConfigOptions {
    let mut options = ConfigOptions::new();
    options.insert(path.clone(), value.clone());
    options
}

/// Value of an environment override for an option with the given default.
///
/// A string option keeps the raw text, so `2024` stays a title. An option
/// without a default takes the YAML scalar when `accepts` it, and the raw
/// text otherwise.
fn typed_env_value(raw: &str, default: &Value, accepts: impl Fn(&Value) -> bool) -> Value {
    let parsed = parse_env_value(raw);
    let as_text = Value::String(raw.to_string());
    match (default, &parsed) {
        (_, Value::Null) | (_, Value::String(_)) => parsed,
        (Value::String(_), _) => as_text,
        (Value::Null, _) if !accepts(&parsed) && accepts(&as_text) => as_text,
        _ => parsed,
    }
}

/// Environment values are YAML scalars; anything that does not parse is a string
fn parse_env_value(raw: &str) -> Value {
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
