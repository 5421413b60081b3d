//! Dataset configuration: settings scoped to one dataset or dataroot

use crate::completion::CompletionContext;
use crate::domains::server::{AuthType, ServerConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::layer::{OptionMapping, SettingsLayer};
use crate::tree::{ConfigOptions, OptionPath};
use crate::validation::{
    validate_non_negative, validate_optional_url, validate_positive, validate_required_string,
    Validatable,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Ontology used for annotation label suggestions when none is configured
pub const DEFAULT_OBO_LOCATION: &str = "http://purl.obolibrary.org/obo/cl.obo";

/// Typed dataset settings, the `dataset` section of the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatasetSettings {
    pub app: DatasetAppConfig,
    pub presentation: PresentationConfig,
    pub user_annotations: UserAnnotationsConfig,
    pub embeddings: EmbeddingsConfig,
    pub diffexp: DatasetDiffexpConfig,

    /// Distribution assumed for the expression matrix when approximating statistics
    #[serde(rename = "X_approximate_distribution")]
    pub x_approximate_distribution: XApproximateDistribution,
}

/// Client application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetAppConfig {
    /// Scripts injected into the client page
    pub scripts: Vec<ScriptSpec>,

    pub inline_scripts: Vec<String>,

    pub about_legal_tos: Option<String>,

    pub about_legal_privacy: Option<String>,

    #[serde(default = "crate::domains::utils::default_true")]
    pub authentication_enable: bool,
}

/// A script reference, either a bare `src` or a full tag description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptSpec {
    Src(String),
    Tag {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        integrity: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crossorigin: Option<String>,
    },
}

impl ScriptSpec {
    pub fn src(&self) -> &str {
        match self {
            ScriptSpec::Src(src) => src,
            ScriptSpec::Tag { src, .. } => src,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Categorical fields with more categories than this are not displayed
    #[serde(default = "default_max_categories")]
    pub max_categories: u32,

    #[serde(default = "crate::domains::utils::default_true")]
    pub custom_colors: bool,
}

/// User-created cell annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAnnotationsConfig {
    #[serde(default = "crate::domains::utils::default_true")]
    pub enable: bool,

    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,

    pub local_file_csv: LocalFileCsvConfig,

    pub ontology: OntologyConfig,

    pub hosted_tiledb_array: HostedTileDbArrayConfig,
}

/// Where user annotations are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    #[default]
    LocalFileCsv,
    HostedTiledbArray,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LocalFileCsvConfig {
    pub directory: Option<String>,
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OntologyConfig {
    #[serde(default = "crate::domains::utils::default_false")]
    pub enable: bool,
    pub obo_location: Option<String>,
}

/// Annotations stored in a hosted database plus array store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostedTileDbArrayConfig {
    /// Relational database holding users, datasets and annotation locators
    pub db_uri: Option<String>,
    /// Directory of the array store holding annotation payloads
    pub hosted_file_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// Embeddings to expose; empty exposes all
    pub names: Vec<String>,
    #[serde(default = "crate::domains::utils::default_false")]
    pub enable_reembedding: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetDiffexpConfig {
    #[serde(default = "crate::domains::utils::default_true")]
    pub enable: bool,

    #[serde(default = "default_lfc_cutoff")]
    pub lfc_cutoff: f64,

    #[serde(default = "default_top_n")]
    pub top_n: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum XApproximateDistribution {
    #[default]
    Normal,
    Count,
}

impl Default for DatasetAppConfig {
    fn default() -> Self {
        Self {
            scripts: Vec::new(),
            inline_scripts: Vec::new(),
            about_legal_tos: None,
            about_legal_privacy: None,
            authentication_enable: true,
        }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            max_categories: default_max_categories(),
            custom_colors: true,
        }
    }
}

impl Default for UserAnnotationsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            annotation_type: AnnotationType::default(),
            local_file_csv: LocalFileCsvConfig::default(),
            ontology: OntologyConfig::default(),
            hosted_tiledb_array: HostedTileDbArrayConfig::default(),
        }
    }
}

impl Default for DatasetDiffexpConfig {
    fn default() -> Self {
        Self {
            enable: true,
            lfc_cutoff: default_lfc_cutoff(),
            top_n: default_top_n(),
        }
    }
}

impl Validatable for DatasetSettings {
    fn validate(&self) -> ConfigResult<()> {
        self.app.validate()?;
        self.presentation.validate()?;
        self.embeddings.validate()?;
        self.diffexp.validate()?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "dataset"
    }
}

impl Validatable for DatasetAppConfig {
    fn validate(&self) -> ConfigResult<()> {
        for script in &self.scripts {
            validate_required_string(script.src(), "scripts.src", self.domain_name())?;
        }
        validate_optional_url(
            self.about_legal_tos.as_deref(),
            "about_legal_tos",
            self.domain_name(),
        )?;
        validate_optional_url(
            self.about_legal_privacy.as_deref(),
            "about_legal_privacy",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "dataset.app"
    }
}

impl Validatable for PresentationConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_categories, "max_categories", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "dataset.presentation"
    }
}

impl Validatable for EmbeddingsConfig {
    fn validate(&self) -> ConfigResult<()> {
        for name in &self.names {
            validate_required_string(name, "names", self.domain_name())?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "dataset.embeddings"
    }
}

impl Validatable for DatasetDiffexpConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_non_negative(self.lfc_cutoff, "lfc_cutoff", self.domain_name())?;
        validate_positive(self.top_n, "top_n", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "dataset.diffexp"
    }
}

/// Values computed from the settings when the configuration is completed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetDerived {
    /// Ontology location in effect, if the ontology is enabled
    pub obo_location: Option<String>,
}

/// Dataset scope: the default dataset config, or the override for one dataroot
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    dataroot_tag: Option<String>,
    layer: SettingsLayer<DatasetSettings>,
    derived: Option<DatasetDerived>,
}

impl DatasetConfig {
    /// Create a dataset scope from the `dataset` section of the default config
    pub fn new(dataroot_tag: Option<String>, default_section: &Value) -> ConfigResult<Self> {
        Ok(Self {
            dataroot_tag,
            layer: SettingsLayer::from_section("dataset", default_section)?,
            derived: None,
        })
    }

    /// Create a dataroot scope whose values start out as `base`'s current values.
    ///
    /// The default snapshot still comes from `default_section`, so diffs are
    /// taken against the static defaults.
    pub fn seeded_from(
        dataroot_tag: impl Into<String>,
        default_section: &Value,
        base: &DatasetConfig,
    ) -> ConfigResult<Self> {
        let mut config = Self::new(Some(dataroot_tag.into()), default_section)?;
        config.layer.replace_settings(base.settings().clone());
        Ok(config)
    }

    /// Dataroot this config overrides, `None` for the default dataset config
    pub fn dataroot_tag(&self) -> Option<&str> {
        self.dataroot_tag.as_deref()
    }

    pub fn settings(&self) -> &DatasetSettings {
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

    pub fn get(&self, path: &OptionPath) -> ConfigResult<Option<Value>> {
        self.layer.get(path)
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

    pub fn derived(&self) -> Option<&DatasetDerived> {
        self.derived.as_ref()
    }

    /// Validate, check rules that depend on the server scope, derive values
    pub fn complete_config(
        &mut self,
        server: &ServerConfig,
        context: &mut CompletionContext<'_>,
    ) -> ConfigResult<()> {
        self.derived = None;
        self.check_config()?;

        self.handle_user_annotations(server)?;
        let obo_location = self.handle_ontology(context);

        self.derived = Some(DatasetDerived { obo_location });
        Ok(())
    }

    fn label(&self) -> String {
        match &self.dataroot_tag {
            Some(tag) => format!("per_dataset_config.{}", tag),
            None => "dataset".to_string(),
        }
    }

    fn handle_user_annotations(&self, server: &ServerConfig) -> ConfigResult<()> {
        let annotations = &self.settings().user_annotations;
        if !annotations.enable {
            return Ok(());
        }

        let domain = format!("{}.user_annotations", self.label());
        match annotations.annotation_type {
            AnnotationType::LocalFileCsv => {
                let csv = &annotations.local_file_csv;
                if csv.directory.is_some() && csv.file.is_some() {
                    return Err(ConfigError::domain(
                        domain,
                        "local_file_csv may set directory or file, not both",
                    ));
                }
                if csv.file.is_some() && server.is_multi_dataset() {
                    return Err(ConfigError::domain(
                        domain,
                        "local_file_csv.file cannot be used in multi-dataset mode",
                    ));
                }
            }
            AnnotationType::HostedTiledbArray => {
                let hosted = &annotations.hosted_tiledb_array;
                validate_required_string(
                    hosted.db_uri.as_deref().unwrap_or_default(),
                    "hosted_tiledb_array.db_uri",
                    &domain,
                )?;
                validate_required_string(
                    hosted.hosted_file_directory.as_deref().unwrap_or_default(),
                    "hosted_tiledb_array.hosted_file_directory",
                    &domain,
                )?;
                if server.authentication_type() == AuthType::None {
                    return Err(ConfigError::domain(
                        domain,
                        "hosted_tiledb_array annotations require server authentication",
                    ));
                }
            }
        }
        Ok(())
    }

    fn handle_ontology(&self, context: &mut CompletionContext<'_>) -> Option<String> {
        let annotations = &self.settings().user_annotations;
        if !annotations.ontology.enable {
            return None;
        }
        if !annotations.enable {
            context.message(format!(
                "{}: ontology is enabled but user annotations are disabled; ontology ignored",
                self.label()
            ));
            return None;
        }

        match &annotations.ontology.obo_location {
            Some(location) => Some(location.clone()),
            None => {
                context.message(format!(
                    "{}: no ontology obo_location configured, using {}",
                    self.label(),
                    DEFAULT_OBO_LOCATION
                ));
                Some(DEFAULT_OBO_LOCATION.to_string())
            }
        }
    }
}

// Default value functions
fn default_max_categories() -> u32 {
    1000
}

fn default_lfc_cutoff() -> f64 {
    0.01
}

fn default_top_n() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(yaml: &str) -> DatasetConfig {
        let section: Value = serde_yaml::from_str(yaml).unwrap();
        DatasetConfig::new(None, &section).unwrap()
    }

    fn server(yaml: &str) -> ServerConfig {
        let section: Value = serde_yaml::from_str(yaml).unwrap();
        ServerConfig::new(&section).unwrap()
    }

    fn complete(config: &mut DatasetConfig, server: &ServerConfig) -> (ConfigResult<()>, Vec<String>) {
        let mut messages = Vec::new();
        let mut sink = |m: &str| messages.push(m.to_string());
        let result = config.complete_config(server, &mut CompletionContext::new(&mut sink));
        (result, messages)
    }

    #[test]
    fn test_dataset_settings_defaults() {
        let settings = DatasetSettings::default();
        assert_eq!(settings.presentation.max_categories, 1000);
        assert!(settings.user_annotations.enable);
        assert_eq!(settings.user_annotations.annotation_type, AnnotationType::LocalFileCsv);
        assert_eq!(settings.diffexp.top_n, 10);
        assert_eq!(settings.x_approximate_distribution, XApproximateDistribution::Normal);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_yaml_names_match_schema() {
        let config = dataset("{}");
        let mapping = config.create_mapping();
        assert!(mapping.contains_key("X_approximate_distribution"));
        assert!(mapping.contains_key("user_annotations__type"));
        assert!(mapping.contains_key("user_annotations__hosted_tiledb_array__db_uri"));
        assert!(mapping.contains_key("app__scripts"));
    }

    #[test]
    fn test_script_specs() {
        let config = dataset(
            r#"
app:
  scripts:
    - https://example.org/a.js
    - src: https://example.org/b.js
      integrity: sha384-abc
"#,
        );
        let scripts = &config.settings().app.scripts;
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].src(), "https://example.org/a.js");
        assert!(matches!(&scripts[1], ScriptSpec::Tag { integrity: Some(_), .. }));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = dataset("{}");
        config
            .update(&ConfigOptions::new().with("presentation__max_categories", 0))
            .unwrap();
        assert!(config.check_config().is_err());

        let mut config = dataset("{}");
        config
            .update(&ConfigOptions::new().with("diffexp__lfc_cutoff", -1.0))
            .unwrap();
        assert!(config.check_config().is_err());

        let mut config = dataset("{}");
        config
            .update(&ConfigOptions::new().with("app__about_legal_tos", "no url"))
            .unwrap();
        assert!(config.check_config().is_err());
    }

    #[test]
    fn test_local_csv_rules() {
        let single = server("single_dataset:\n  datapath: /data/a.h5ad\n");
        let multi = server("multi_dataset:\n  dataroot:\n    d1: /data/d1\n");

        let mut config = dataset("user_annotations:\n  local_file_csv:\n    directory: /tmp\n    file: a.csv\n");
        assert!(complete(&mut config, &single).0.is_err());

        let mut config = dataset("user_annotations:\n  local_file_csv:\n    file: a.csv\n");
        assert!(complete(&mut config, &single).0.is_ok());
        assert!(complete(&mut config, &multi).0.is_err());
    }

    #[test]
    fn test_hosted_annotations_require_locations_and_auth() {
        let session = server("single_dataset:\n  datapath: /data/a.h5ad\n");
        let no_auth = server("single_dataset:\n  datapath: /data/a.h5ad\nauthentication:\n  type: none\n");

        let mut config = dataset("user_annotations:\n  type: hosted_tiledb_array\n");
        assert!(complete(&mut config, &session).0.is_err());

        let mut config = dataset(
            r#"
user_annotations:
  type: hosted_tiledb_array
  hosted_tiledb_array:
    db_uri: postgresql://localhost/cellxgene
    hosted_file_directory: s3://bucket/annotations
"#,
        );
        assert!(complete(&mut config, &session).0.is_ok());
        assert!(complete(&mut config, &no_auth).0.is_err());
    }

    #[test]
    fn test_ontology_derivation() {
        let server = server("single_dataset:\n  datapath: /data/a.h5ad\n");

        let mut config = dataset("user_annotations:\n  ontology:\n    enable: true\n");
        let (result, messages) = complete(&mut config, &server);
        result.unwrap();
        assert_eq!(
            config.derived().unwrap().obo_location.as_deref(),
            Some(DEFAULT_OBO_LOCATION)
        );
        assert_eq!(messages.len(), 1);

        let mut config = dataset("user_annotations:\n  enable: false\n  ontology:\n    enable: true\n");
        let (result, messages) = complete(&mut config, &server);
        result.unwrap();
        assert_eq!(config.derived().unwrap().obo_location, None);
        assert!(messages[0].contains("ontology ignored"));
    }

    #[test]
    fn test_seeded_from_copies_current_values_but_keeps_static_defaults() {
        let section = Value::Mapping(Default::default());
        let mut base = DatasetConfig::new(None, &section).unwrap();
        base.update(&ConfigOptions::new().with("diffexp__top_n", 25)).unwrap();

        let seeded = DatasetConfig::seeded_from("d1", &section, &base).unwrap();
        assert_eq!(seeded.dataroot_tag(), Some("d1"));
        assert_eq!(seeded.settings(), base.settings());
        assert_eq!(
            seeded.changes_from_default().unwrap()["diffexp__top_n"],
            Value::from(25)
        );
    }

    #[test]
    fn test_unknown_distribution_rejected() {
        let mut config = dataset("{}");
        let result = config.update(&ConfigOptions::new().with("X_approximate_distribution", "poisson"));
        assert!(result.is_err());
        assert_eq!(
            config.settings().x_approximate_distribution,
            XApproximateDistribution::Normal
        );
    }
}
