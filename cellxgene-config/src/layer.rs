//! Typed settings layered over a default-config snapshot
//!
//! [`SettingsLayer`] is the engine shared by the server and dataset scopes: it
//! owns the current typed settings, plus the normalized default tree they were
//! created from, which doubles as the schema for option names.

use crate::error::{ConfigError, ConfigResult};
use crate::tree::{self, ConfigOptions, OptionPath};
use crate::validation::Validatable;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Option name -> (path, default value)
pub type OptionMapping = BTreeMap<String, (OptionPath, Value)>;

#[derive(Debug, Clone)]
pub struct SettingsLayer<T> {
    scope: &'static str,
    settings: T,
    default_config: Value,
}

impl<T> SettingsLayer<T>
where
    T: Serialize + DeserializeOwned + Validatable,
{
    /// Build the layer from a section of the default configuration
    pub fn from_section(scope: &'static str, section: &Value) -> ConfigResult<Self> {
        let section = if section.is_null() {
            Value::Mapping(Default::default())
        } else {
            section.clone()
        };
        let settings: T = serde_yaml::from_value(section).map_err(|e| ConfigError::InvalidValue {
            context: scope.to_string(),
            message: e.to_string(),
        })?;
        let default_config = serde_yaml::to_value(&settings)?;

        Ok(Self {
            scope,
            settings,
            default_config,
        })
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn settings(&self) -> &T {
        &self.settings
    }

    /// Replace every value at once, keeping the default snapshot
    pub fn replace_settings(&mut self, settings: T) {
        self.settings = settings;
    }

    pub fn default_config(&self) -> &Value {
        &self.default_config
    }

    /// Every option of the scope with its path and default value
    pub fn create_mapping(&self) -> OptionMapping {
        tree::leaves(&self.default_config)
            .into_iter()
            .map(|(path, value)| (path.to_string(), (path, value)))
            .collect()
    }

    /// Apply named options; each name must be an option of this scope
    pub fn update(&mut self, options: &ConfigOptions) -> ConfigResult<()> {
        for (path, _) in options.iter() {
            if !self.is_option(path) {
                return Err(ConfigError::UnknownOption {
                    context: self.scope.to_string(),
                    name: path.to_string(),
                });
            }
        }
        self.apply(options, self.scope)
    }

    /// Apply a nested mapping shaped like the default section
    pub fn update_from_config(&mut self, config: &Value, context: &str) -> ConfigResult<()> {
        let overrides = tree::collect_overrides(&self.default_config, config, context)?;
        self.apply(&overrides, context)
    }

    /// Current value of one option
    pub fn get(&self, path: &OptionPath) -> ConfigResult<Option<Value>> {
        let current = self.to_value()?;
        Ok(tree::get(&current, path).cloned())
    }

    /// Options whose current value differs from the default snapshot
    pub fn changes_from_default(&self) -> ConfigResult<BTreeMap<String, Value>> {
        let current = self.to_value()?;
        let changes = tree::leaves(&self.default_config)
            .into_iter()
            .filter_map(|(path, default)| {
                let value = tree::get(&current, &path).cloned().unwrap_or(Value::Null);
                (value != default).then(|| (path.to_string(), value))
            })
            .collect();
        Ok(changes)
    }

    pub fn check_config(&self) -> ConfigResult<()> {
        self.settings.validate()
    }

    /// Current settings as a nested tree
    pub fn to_value(&self) -> ConfigResult<Value> {
        Ok(serde_yaml::to_value(&self.settings)?)
    }

    fn is_option(&self, path: &OptionPath) -> bool {
        match tree::get(&self.default_config, path) {
            Some(node) => !node.as_mapping().is_some_and(|m| !m.is_empty()),
            None => false,
        }
    }

    /// Set the options on a copy of the tree and read it back into `T`; a
    /// value that does not fit leaves the current settings untouched.
    fn apply(&mut self, options: &ConfigOptions, context: &str) -> ConfigResult<()> {
        if options.is_empty() {
            return Ok(());
        }

        let mut current = self.to_value()?;
        for (path, value) in options.iter() {
            if !tree::set(&mut current, path, value.clone()) {
                return Err(ConfigError::UnknownOption {
                    context: context.to_string(),
                    name: path.to_string(),
                });
            }
        }

        self.settings = serde_yaml::from_value(current).map_err(|e| ConfigError::InvalidValue {
            context: context.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
