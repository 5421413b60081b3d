//! Application configuration: the server scope, the default dataset scope and
//! per-dataroot dataset overrides, with their shared lifecycle

use crate::capabilities::{CacheManager, DataAdaptorTitleProvider};
use crate::completion::CompletionContext;
use crate::domains::{DatasetConfig, ServerConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::layer::OptionMapping;
use crate::loader::DefaultConfig;
use crate::tree::{ConfigOptions, OptionPath};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const SERVER_KEY: &str = "server";
const DATASET_KEY: &str = "dataset";
const PER_DATASET_KEY: &str = "per_dataset_config";

/// Lifecycle of an [`AppConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    /// Holds only the default values
    Unconfigured,
    /// Modified since construction or since the last completion
    Configuring,
    /// Validated and derived; effective values may be read
    Completed,
}

/// How a default dataset update treats dataroot configs that changed the same option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadePolicy {
    /// Apply the new value to every dataroot config, warning for each value replaced
    #[default]
    Overwrite,
    /// Leave options a dataroot config has set to a value of its own. A dataroot
    /// value equal to the previous default counts as inherited and is replaced.
    PreserveOverrides,
}

/// Options that differ from the default config, keyed by option name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigChanges {
    pub server: BTreeMap<String, Value>,
    pub dataset: BTreeMap<String, Value>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.server.is_empty() && self.dataset.is_empty()
    }
}

/// Root configuration object of the application
#[derive(Debug, Clone)]
pub struct AppConfig {
    default_config: DefaultConfig,
    server_config: ServerConfig,
    default_dataset_config: DatasetConfig,
    dataroot_config: BTreeMap<String, DatasetConfig>,
    state: ConfigState,
}

impl AppConfig {
    /// Create a configuration seeded from the default config resource
    pub fn new() -> ConfigResult<Self> {
        Self::with_default_config(Self::get_default_config()?)
    }

    /// The default config resource, see [`DefaultConfig::load`]
    pub fn get_default_config() -> ConfigResult<DefaultConfig> {
        DefaultConfig::load()
    }

    pub fn with_default_config(default_config: DefaultConfig) -> ConfigResult<Self> {
        let server_config = ServerConfig::new(default_config.server())?;
        let default_dataset_config = DatasetConfig::new(None, default_config.dataset())?;
        Ok(Self {
            default_config,
            server_config,
            default_dataset_config,
            dataroot_config: BTreeMap::new(),
            state: ConfigState::Unconfigured,
        })
    }

    pub fn state(&self) -> ConfigState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == ConfigState::Completed
    }

    pub fn default_config(&self) -> &DefaultConfig {
        &self.default_config
    }

    /// Option names of the server scope
    pub fn server_options(&self) -> OptionMapping {
        self.server_config.create_mapping()
    }

    /// Option names of the dataset scope
    pub fn dataset_options(&self) -> OptionMapping {
        self.default_dataset_config.create_mapping()
    }

    /// Tags that have a dataroot config
    pub fn dataroot_config_tags(&self) -> impl Iterator<Item = &str> {
        self.dataroot_config.keys().map(String::as_str)
    }

    pub fn update_server_config(&mut self, options: &ConfigOptions) -> ConfigResult<()> {
        self.mark_configuring();
        self.server_config.update(options)
    }

    /// Update the default dataset config and cascade the same options to every
    /// dataroot config, overwriting values they customized
    pub fn update_default_dataset_config(&mut self, options: &ConfigOptions) -> ConfigResult<()> {
        self.update_default_dataset_config_with_policy(options, CascadePolicy::Overwrite)
    }

    pub fn update_default_dataset_config_with_policy(
        &mut self,
        options: &ConfigOptions,
        policy: CascadePolicy,
    ) -> ConfigResult<()> {
        self.mark_configuring();

        let previous = options
            .iter()
            .map(|(path, _)| self.default_dataset_config.get(path))
            .collect::<ConfigResult<Vec<_>>>()?;
        self.default_dataset_config.update(options)?;

        for (tag, dataroot) in self.dataroot_config.iter_mut() {
            let mut cascaded = ConfigOptions::new();
            for ((path, value), before) in options.iter().zip(&previous) {
                let current = dataroot.get(path)?;
                if current != *before && current.as_ref() != Some(value) {
                    match policy {
                        CascadePolicy::Overwrite => log::warn!(
                            "dataset option {} replaces the value customized by dataroot '{}'",
                            path,
                            tag
                        ),
                        CascadePolicy::PreserveOverrides => {
                            log::debug!("keeping dataset option {} customized by dataroot '{}'", path, tag);
                            continue;
                        }
                    }
                }
                cascaded.insert(path.clone(), value.clone());
            }
            dataroot.update(&cascaded)?;
        }
        Ok(())
    }

    /// Layer a YAML config file onto the current values
    pub fn update_from_config_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        self.update_from_yaml_str(&content)
    }

    /// Layer a YAML document with optional `server`, `dataset` and
    /// `per_dataset_config` sections onto the current values
    pub fn update_from_yaml_str(&mut self, content: &str) -> ConfigResult<()> {
        let config: Value = serde_yaml::from_str(content)?;
        self.mark_configuring();
        if config.is_null() {
            return Ok(());
        }

        let Some(sections) = config.as_mapping() else {
            return Err(ConfigError::InvalidValue {
                context: "config file".to_string(),
                message: "expected a mapping of configuration sections".to_string(),
            });
        };
        for key in sections.keys() {
            let known = matches!(key.as_str(), Some(SERVER_KEY | DATASET_KEY | PER_DATASET_KEY));
            if !known {
                return Err(ConfigError::UnknownOption {
                    context: "config file".to_string(),
                    name: key_name(key),
                });
            }
        }

        if let Some(server) = sections.get(SERVER_KEY) {
            self.server_config.update_from_config(server, SERVER_KEY)?;
        }
        if let Some(dataset) = sections.get(DATASET_KEY) {
            self.default_dataset_config.update_from_config(dataset, DATASET_KEY)?;
        }

        let per_dataset = match sections.get(PER_DATASET_KEY) {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Mapping(per_dataset)) => per_dataset,
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    context: PER_DATASET_KEY.to_string(),
                    message: "expected a mapping of dataroot tags".to_string(),
                })
            }
        };
        for (key, overrides) in per_dataset {
            let Some(tag) = key.as_str() else {
                return Err(ConfigError::InvalidValue {
                    context: PER_DATASET_KEY.to_string(),
                    message: format!("dataroot tag {} is not a string", key_name(key)),
                });
            };
            self.add_dataroot_config(tag, &ConfigOptions::new())?;
            if let Some(dataroot) = self.dataroot_config.get_mut(tag) {
                let context = OptionPath::from(PER_DATASET_KEY).child(tag).to_string();
                dataroot.update_from_config(overrides, &context)?;
            }
        }
        Ok(())
    }

    /// Current values as a nested tree with the config file layout
    pub fn to_value(&self) -> ConfigResult<Value> {
        let mut root = Mapping::new();
        root.insert(SERVER_KEY.into(), self.server_config.to_value()?);
        root.insert(DATASET_KEY.into(), self.default_dataset_config.to_value()?);
        if !self.dataroot_config.is_empty() {
            let mut per_dataset = Mapping::new();
            for (tag, config) in &self.dataroot_config {
                per_dataset.insert(Value::String(tag.clone()), config.to_value()?);
            }
            root.insert(PER_DATASET_KEY.into(), Value::Mapping(per_dataset));
        }
        Ok(Value::Mapping(root))
    }

    pub fn to_yaml_string(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(&self.to_value()?)?)
    }

    /// Write the current values as YAML; reading the file back reproduces them
    pub fn write_config(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let yaml = self.to_yaml_string()?;
        std::fs::write(path, yaml)?;
        log::debug!("Wrote configuration to {}", path.display());
        Ok(())
    }

    /// Server and default dataset options that differ from the default config
    pub fn changes_from_default(&self) -> ConfigResult<ConfigChanges> {
        Ok(ConfigChanges {
            server: self.server_config.changes_from_default()?,
            dataset: self.default_dataset_config.changes_from_default()?,
        })
    }

    /// Create the dataset config of one dataroot, starting from the current
    /// default dataset values with `overrides` applied on top
    pub fn add_dataroot_config(&mut self, dataroot_tag: &str, overrides: &ConfigOptions) -> ConfigResult<()> {
        if self.dataroot_config.contains_key(dataroot_tag) {
            return Err(ConfigError::DuplicateDataroot(dataroot_tag.to_string()));
        }
        if !self.server_config.dataroot_tags()?.contains_key(dataroot_tag) {
            return Err(ConfigError::DatarootNotFound(dataroot_tag.to_string()));
        }

        self.mark_configuring();
        let mut config = DatasetConfig::seeded_from(
            dataroot_tag,
            self.default_config.dataset(),
            &self.default_dataset_config,
        )?;
        config.update(overrides)?;
        self.dataroot_config.insert(dataroot_tag.to_string(), config);
        Ok(())
    }

    /// Provide the matrix cache manager instead of letting completion create one
    pub fn set_matrix_data_cache_manager(&mut self, manager: Arc<dyn CacheManager>) {
        self.mark_configuring();
        self.server_config.set_matrix_data_cache_manager(manager);
    }

    /// Complete the configuration, discarding informational messages
    pub fn complete_config(&mut self) -> ConfigResult<CompletedConfig<'_>> {
        self.complete_config_with(|_| {})
    }

    /// Validate every scope, apply cross-scope rules and derive completion-time
    /// values. Informational messages are passed to `messagefn`.
    pub fn complete_config_with<F>(&mut self, mut messagefn: F) -> ConfigResult<CompletedConfig<'_>>
    where
        F: FnMut(&str),
    {
        let resume = match self.state {
            ConfigState::Completed => ConfigState::Configuring,
            state => state,
        };
        self.state = resume;

        let mut context = CompletionContext::new(&mut messagefn);
        self.server_config.complete_config(&mut context)?;
        self.default_dataset_config
            .complete_config(&self.server_config, &mut context)?;
        for dataroot in self.dataroot_config.values_mut() {
            dataroot.complete_config(&self.server_config, &mut context)?;
        }

        self.state = ConfigState::Completed;
        if let Err(err) = self.check_config() {
            self.state = resume;
            return Err(err);
        }
        log::info!(
            "Configuration completed with {} dataroot config(s)",
            self.dataroot_config.len()
        );
        Ok(CompletedConfig { config: self })
    }

    /// Succeeds only for a completed configuration whose scopes all validate
    pub fn check_config(&self) -> ConfigResult<()> {
        if self.state != ConfigState::Completed {
            return Err(ConfigError::NotCompleted);
        }
        self.server_config.check_config()?;
        self.default_dataset_config.check_config()?;
        for dataroot in self.dataroot_config.values() {
            dataroot.check_config()?;
        }
        Ok(())
    }

    /// Read access to the effective configuration of a completed config
    pub fn completed(&self) -> ConfigResult<CompletedConfig<'_>> {
        match self.state {
            ConfigState::Completed => Ok(CompletedConfig { config: self }),
            _ => Err(ConfigError::NotCompleted),
        }
    }

    fn mark_configuring(&mut self) {
        self.state = ConfigState::Configuring;
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(name) => name.clone(),
        other => serde_yaml::to_string(other)
            .map(|yaml| yaml.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Read-only view of a completed [`AppConfig`]
#[derive(Debug, Clone, Copy)]
pub struct CompletedConfig<'a> {
    config: &'a AppConfig,
}

impl<'a> CompletedConfig<'a> {
    pub fn app_config(&self) -> &'a AppConfig {
        self.config
    }

    pub fn server_config(&self) -> &'a ServerConfig {
        &self.config.server_config
    }

    pub fn default_dataset_config(&self) -> &'a DatasetConfig {
        &self.config.default_dataset_config
    }

    pub fn dataroot_configs(&self) -> &'a BTreeMap<String, DatasetConfig> {
        &self.config.dataroot_config
    }

    pub fn dataroot_config(&self, dataroot_tag: &str) -> Option<&'a DatasetConfig> {
        self.config.dataroot_config.get(dataroot_tag)
    }

    /// Dataset config in effect for a dataroot; the default dataset config in
    /// single-dataset mode and for dataroots without their own config
    pub fn get_dataset_config(&self, dataroot_key: &str) -> &'a DatasetConfig {
        if self.config.server_config.single_dataset_datapath().is_some() {
            return &self.config.default_dataset_config;
        }
        self.config
            .dataroot_config
            .get(dataroot_key)
            .unwrap_or(&self.config.default_dataset_config)
    }

    pub fn get_matrix_data_cache_manager(&self) -> Option<&'a Arc<dyn CacheManager>> {
        self.config.server_config.matrix_data_cache_manager()
    }

    pub fn is_multi_dataset(&self) -> bool {
        self.config.server_config.is_multi_dataset()
    }

    /// Configured single-dataset title, falling back to the data adaptor's
    pub fn get_title(&self, data_adaptor: &dyn DataAdaptorTitleProvider) -> String {
        non_empty(&self.config.server_config.settings().single_dataset.title)
            .unwrap_or_else(|| data_adaptor.get_title())
    }

    /// Configured single-dataset description, falling back to the data adaptor's
    pub fn get_about(&self, data_adaptor: &dyn DataAdaptorTitleProvider) -> Option<String> {
        non_empty(&self.config.server_config.settings().single_dataset.about)
            .or_else(|| data_adaptor.get_about())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|value| !value.is_empty()).cloned()
}
