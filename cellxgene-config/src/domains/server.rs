//! Server configuration: settings that apply to the server process as a whole

use crate::capabilities::{CacheManager, MatrixDataCacheManager};
use crate::completion::CompletionContext;
use crate::error::{ConfigError, ConfigResult};
use crate::layer::{OptionMapping, SettingsLayer};
use crate::tree::ConfigOptions;
use crate::validation::{
    validate_optional_url, validate_port_range, validate_positive, validate_required_string,
    Validatable,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Port used when `app.port` is not configured
pub const DEFAULT_PORT: u16 = 5005;

/// Typed server settings, the `server` section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerSettings {
    pub app: ServerAppConfig,
    pub authentication: AuthenticationConfig,
    pub multi_dataset: MultiDatasetConfig,
    pub single_dataset: SingleDatasetConfig,
    pub diffexp: ServerDiffexpConfig,
    pub data_locator: DataLocatorConfig,
    pub adaptor: AdaptorConfig,
    pub limits: LimitsConfig,
}

/// Web application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerAppConfig {
    #[serde(default = "crate::domains::utils::default_false")]
    pub verbose: bool,

    #[serde(default = "crate::domains::utils::default_false")]
    pub debug: bool,

    /// Host the server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the server binds to; [`DEFAULT_PORT`] when unset
    pub port: Option<u16>,

    #[serde(default = "crate::domains::utils::default_false")]
    pub open_browser: bool,

    #[serde(default = "crate::domains::utils::default_false")]
    pub force_https: bool,

    /// Key used to sign session cookies
    pub secret_key: Option<String>,

    #[serde(default = "crate::domains::utils::default_false")]
    pub generate_cache_control_headers: bool,

    #[serde(default = "crate::domains::utils::default_false")]
    pub server_timing_headers: bool,

    /// Base URL of the REST API, if served from a different origin
    pub api_base_url: Option<String>,

    /// Base URL of the web client; defaults to `api_base_url`
    pub web_base_url: Option<String>,
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthenticationConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,

    #[serde(default = "crate::domains::utils::default_false")]
    pub insecure_test_environment: bool,
}

/// Authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    #[default]
    Session,
    Oauth,
}

/// Settings for serving many datasets from one or more dataroots
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MultiDatasetConfig {
    /// A single dataroot path, or a mapping of dataroot tag to location
    pub dataroot: Option<DatarootSetting>,

    /// Whether to serve a listing of available datasets
    #[serde(default = "crate::domains::utils::default_false")]
    pub index: bool,

    /// Matrix formats that may be opened; empty allows all
    pub allowed_matrix_types: Vec<MatrixType>,

    pub matrix_cache: MatrixCacheConfig,
}

/// `multi_dataset.dataroot` value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatarootSetting {
    Path(String),
    Mapped(BTreeMap<String, DatarootLocation>),
}

/// Location of one tagged dataroot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatarootLocation {
    /// Plain path, served under the dataroot tag
    Path(String),
    /// Path served under an explicit base url
    Mount { base_url: String, dataroot: String },
}

impl DatarootLocation {
    pub fn path(&self) -> &str {
        match self {
            DatarootLocation::Path(path) => path,
            DatarootLocation::Mount { dataroot, .. } => dataroot,
        }
    }

    /// URL prefix for the dataroot; the tag unless a mount names one
    pub fn base_url<'a>(&'a self, tag: &'a str) -> &'a str {
        match self {
            DatarootLocation::Path(_) => tag,
            DatarootLocation::Mount { base_url, .. } => base_url,
        }
    }
}

/// Matrix storage formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixType {
    Cxg,
    H5ad,
}

/// Cache of opened dataset matrices in multi-dataset mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixCacheConfig {
    #[serde(default = "default_max_datasets")]
    pub max_datasets: usize,

    /// Seconds an idle dataset may stay cached
    #[serde(default = "default_timelimit_s")]
    pub timelimit_s: Option<u64>,
}

/// Settings for serving exactly one dataset
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SingleDatasetConfig {
    pub datapath: Option<String>,
    pub obs_names: Option<String>,
    pub var_names: Option<String>,
    /// Overrides the dataset description reported by the data adaptor
    pub about: Option<String>,
    /// Overrides the dataset title reported by the data adaptor
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerDiffexpConfig {
    pub alg_cxg: AlgCxgConfig,
}

/// Differential expression worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgCxgConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_cpu_multiplier")]
    pub cpu_multiplier: usize,

    #[serde(default = "default_target_workunit")]
    pub target_workunit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataLocatorConfig {
    pub s3: S3LocatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3LocatorConfig {
    /// AWS region, or `auto` to resolve it from the bucket
    #[serde(default = "default_region_name")]
    pub region_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdaptorConfig {
    pub anndata_adaptor: AnndataAdaptorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnndataAdaptorConfig {
    #[serde(default = "crate::domains::utils::default_false")]
    pub backed: bool,
}

/// Request size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    #[serde(default = "default_column_request_max")]
    pub column_request_max: u32,

    pub diffexp_cellcount_max: Option<u64>,
}

impl Default for ServerAppConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            debug: false,
            host: default_host(),
            port: None,
            open_browser: false,
            force_https: false,
            secret_key: None,
            generate_cache_control_headers: false,
            server_timing_headers: false,
            api_base_url: None,
            web_base_url: None,
        }
    }
}

impl Default for MatrixCacheConfig {
    fn default() -> Self {
        Self {
            max_datasets: default_max_datasets(),
            timelimit_s: default_timelimit_s(),
        }
    }
}

impl Default for AlgCxgConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            cpu_multiplier: default_cpu_multiplier(),
            target_workunit: default_target_workunit(),
        }
    }
}

impl Default for S3LocatorConfig {
    fn default() -> Self {
        Self {
            region_name: default_region_name(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            column_request_max: default_column_request_max(),
            diffexp_cellcount_max: None,
        }
    }
}

impl Validatable for ServerSettings {
    fn validate(&self) -> ConfigResult<()> {
        self.app.validate()?;
        self.multi_dataset.validate()?;
        self.diffexp.alg_cxg.validate()?;
        self.data_locator.s3.validate()?;
        self.limits.validate()?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server"
    }
}

impl Validatable for ServerAppConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.host, "host", self.domain_name())?;
        if let Some(port) = self.port {
            validate_port_range(port, "port", self.domain_name())?;
        }
        validate_optional_url(self.api_base_url.as_deref(), "api_base_url", self.domain_name())?;
        validate_optional_url(self.web_base_url.as_deref(), "web_base_url", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server.app"
    }
}

impl Validatable for MultiDatasetConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.matrix_cache.max_datasets,
            "matrix_cache.max_datasets",
            self.domain_name(),
        )?;
        if let Some(timelimit) = self.matrix_cache.timelimit_s {
            validate_positive(timelimit, "matrix_cache.timelimit_s", self.domain_name())?;
        }

        match &self.dataroot {
            None => {}
            Some(DatarootSetting::Path(path)) => {
                validate_required_string(path, "dataroot", self.domain_name())?;
            }
            Some(DatarootSetting::Mapped(dataroots)) => {
                let mut base_urls = HashSet::new();
                for (tag, location) in dataroots {
                    validate_required_string(tag, "dataroot tag", self.domain_name())?;
                    validate_required_string(
                        location.path(),
                        &format!("dataroot path for '{}'", tag),
                        self.domain_name(),
                    )?;
                    let base_url = location.base_url(tag);
                    if !base_urls.insert(base_url) {
                        return Err(self.validation_error(format!(
                            "dataroot base_url '{}' is used more than once",
                            base_url
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server.multi_dataset"
    }
}

impl Validatable for AlgCxgConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_workers, "max_workers", self.domain_name())?;
        validate_positive(self.cpu_multiplier, "cpu_multiplier", self.domain_name())?;
        validate_positive(self.target_workunit, "target_workunit", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server.diffexp.alg_cxg"
    }
}

impl Validatable for S3LocatorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.region_name, "region_name", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "server.data_locator.s3"
    }
}

impl Validatable for LimitsConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.column_request_max, "column_request_max", self.domain_name())?;
        if let Some(max) = self.diffexp_cellcount_max {
            validate_positive(max, "diffexp_cellcount_max", self.domain_name())?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server.limits"
    }
}

/// Values computed from the settings when the configuration is completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDerived {
    pub port: u16,
    pub web_base_url: Option<String>,
    pub diffexp_max_workers: usize,
}

/// Server scope of the application configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    layer: SettingsLayer<ServerSettings>,
    matrix_data_cache_manager: Option<Arc<dyn CacheManager>>,
    /// Set when the manager came from the caller; completion then leaves it alone
    cache_manager_injected: bool,
    derived: Option<ServerDerived>,
}

impl ServerConfig {
    /// Create the server scope from the `server` section of the default config
    pub fn new(default_section: &Value) -> ConfigResult<Self> {
        Ok(Self {
            layer: SettingsLayer::from_section("server", default_section)?,
            matrix_data_cache_manager: None,
            cache_manager_injected: false,
            derived: None,
        })
    }

    pub fn settings(&self) -> &ServerSettings {
        self.layer.settings()
    }

    pub fn default_config(&self) -> &Value {
        self.layer.default_config()
    }

    pub fn update(&mut self, options: &ConfigOptions) -> ConfigResult<()> {
        self.derived = None;
        self.layer.update(options)
    }

    pub fn update_from_config(&mut self, config: &Value, context: &str) -> ConfigResult<()> {
        self.derived = None;
        self.layer.update_from_config(config, context)
    }

    pub fn create_mapping(&self) -> OptionMapping {
        self.layer.create_mapping()
    }

    pub fn changes_from_default(&self) -> ConfigResult<BTreeMap<String, Value>> {
        self.layer.changes_from_default()
    }

    pub fn check_config(&self) -> ConfigResult<()> {
        self.layer.check_config()
    }

    pub fn to_value(&self) -> ConfigResult<Value> {
        self.layer.to_value()
    }

    /// Datapath of single-dataset mode; an empty path counts as unset
    pub fn single_dataset_datapath(&self) -> Option<&str> {
        self.settings()
            .single_dataset
            .datapath
            .as_deref()
            .filter(|path| !path.is_empty())
    }

    pub fn is_multi_dataset(&self) -> bool {
        self.settings().multi_dataset.dataroot.is_some()
    }

    /// Tagged dataroots; fails unless the dataroot setting is a mapping
    pub fn dataroot_tags(&self) -> ConfigResult<&BTreeMap<String, DatarootLocation>> {
        match &self.settings().multi_dataset.dataroot {
            Some(DatarootSetting::Mapped(dataroots)) => Ok(dataroots),
            _ => Err(ConfigError::DatarootNotMapping),
        }
    }

    pub fn authentication_type(&self) -> AuthType {
        self.settings().authentication.auth_type
    }

    /// Use a caller-provided cache manager instead of creating one at completion
    pub fn set_matrix_data_cache_manager(&mut self, manager: Arc<dyn CacheManager>) {
        self.matrix_data_cache_manager = Some(manager);
        self.cache_manager_injected = true;
    }

    pub fn matrix_data_cache_manager(&self) -> Option<&Arc<dyn CacheManager>> {
        self.matrix_data_cache_manager.as_ref()
    }

    /// Values derived by the last successful completion
    pub fn derived(&self) -> Option<&ServerDerived> {
        self.derived.as_ref()
    }

    /// Validate, check cross-field rules and derive completion-time values
    pub fn complete_config(&mut self, context: &mut CompletionContext<'_>) -> ConfigResult<()> {
        self.derived = None;
        self.check_config()?;

        let (port, web_base_url) = self.handle_app(context);
        self.handle_authentication(context);
        self.handle_data_source(context)?;
        let diffexp_max_workers = self.handle_diffexp();

        self.derived = Some(ServerDerived {
            port,
            web_base_url,
            diffexp_max_workers,
        });
        Ok(())
    }

    fn handle_app(&self, context: &mut CompletionContext<'_>) -> (u16, Option<String>) {
        let app = &self.settings().app;
        let port = match app.port {
            Some(port) => port,
            None => {
                context.message(format!("No port specified, using default port {}", DEFAULT_PORT));
                DEFAULT_PORT
            }
        };
        let web_base_url = app.web_base_url.clone().or_else(|| app.api_base_url.clone());
        (port, web_base_url)
    }

    fn handle_authentication(&self, context: &mut CompletionContext<'_>) {
        let settings = self.settings();
        if settings.authentication.insecure_test_environment {
            context.message(
                "Warning: authentication.insecure_test_environment is enabled; never use it in production",
            );
        }
        if settings.authentication.auth_type == AuthType::Session && settings.app.secret_key.is_none() {
            context.message("Session authentication is enabled without app.secret_key");
        }
    }

    fn handle_data_source(&mut self, context: &mut CompletionContext<'_>) -> ConfigResult<()> {
        let settings = self.settings();
        let manager = match (self.single_dataset_datapath(), &settings.multi_dataset.dataroot) {
            (None, None) => {
                return Err(ConfigError::domain(
                    "server",
                    "missing datapath: set single_dataset.datapath or multi_dataset.dataroot",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::domain(
                    "server",
                    "must supply only one of datapath or dataroot",
                ))
            }
            (Some(_), None) => {
                if settings.multi_dataset.index {
                    context.message("multi_dataset.index is ignored in single-dataset mode");
                }
                MatrixDataCacheManager::new(1, None)
            }
            (None, Some(_)) => {
                let cache = &settings.multi_dataset.matrix_cache;
                MatrixDataCacheManager::new(
                    cache.max_datasets,
                    cache.timelimit_s.map(Duration::from_secs),
                )
            }
        };

        // Rebuilt on every completion so it follows the current mode and matrix_cache
        if !self.cache_manager_injected {
            self.matrix_data_cache_manager = Some(Arc::new(manager));
        }
        Ok(())
    }

    fn handle_diffexp(&self) -> usize {
        let alg = &self.settings().diffexp.alg_cxg;
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        alg.max_workers.min(alg.cpu_multiplier.saturating_mul(cpus))
    }
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_max_datasets() -> usize {
    5
}

fn default_timelimit_s() -> Option<u64> {
    Some(30)
}

fn default_max_workers() -> usize {
    64
}

fn default_cpu_multiplier() -> usize {
    4
}

fn default_target_workunit() -> u64 {
    16_000_000
}

fn default_region_name() -> String {
    "auto".to_string()
}

fn default_column_request_max() -> u32 {
    32
}
