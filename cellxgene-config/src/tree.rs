//! Typed option paths and structural walks over nested configuration trees
//!
//! Every scope (server, dataset) is a nested YAML mapping of option groups to
//! option names. Instead of joining keys into `group__name` strings, options
//! are addressed by an [`OptionPath`] and the tree is walked segment by segment.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::str::FromStr;

/// Address of a single option inside a scope, e.g. `["multi_dataset", "dataroot"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OptionPath(Vec<String>);

impl OptionPath {
    /// Separator used by the flat, legacy spelling of option names
    pub const SEPARATOR: &'static str = "__";

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path extended by one segment
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for OptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(Self::SEPARATOR))
    }
}

impl From<&str> for OptionPath {
    fn from(name: &str) -> Self {
        Self::new(name.split(Self::SEPARATOR))
    }
}

impl FromStr for OptionPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.split(Self::SEPARATOR).any(str::is_empty) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid option name: '{}'",
                s
            )));
        }
        Ok(Self::from(s))
    }
}

/// Ordered set of named option values, applied in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOptions {
    entries: Vec<(OptionPath, Value)>,
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option by its flat name (`user_annotations__enable`)
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(OptionPath::from(name), value.into());
        self
    }

    /// Add an option by path, replacing an earlier value for the same path
    pub fn insert(&mut self, path: OptionPath, value: Value) {
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((path, value)),
        }
    }

    pub fn get(&self, path: &OptionPath) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(OptionPath, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(OptionPath, Value)> for ConfigOptions {
    fn from_iter<T: IntoIterator<Item = (OptionPath, Value)>>(iter: T) -> Self {
        let mut options = ConfigOptions::new();
        for (path, value) in iter {
            options.insert(path, value);
        }
        options
    }
}

impl IntoIterator for ConfigOptions {
    type Item = (OptionPath, Value);
    type IntoIter = std::vec::IntoIter<(OptionPath, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Look up the node at `path`
pub fn get<'a>(tree: &'a Value, path: &OptionPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(tree, |node, segment| node.as_mapping()?.get(segment.as_str()))
}

/// Replace the node at `path`. Intermediate groups must already exist.
pub fn set(tree: &mut Value, path: &OptionPath, value: Value) -> bool {
    let Some((last, parents)) = path.segments().split_last() else {
        *tree = value;
        return true;
    };

    let mut node = tree;
    for segment in parents {
        match node.as_mapping_mut().and_then(|m| m.get_mut(segment.as_str())) {
            Some(child) => node = child,
            None => return false,
        }
    }

    match node.as_mapping_mut() {
        Some(mapping) => {
            mapping.insert(Value::String(last.clone()), value);
            true
        }
        None => false,
    }
}

/// A node is a group when it is a non-empty mapping; everything else is an option
fn is_group(node: &Value) -> bool {
    node.as_mapping().is_some_and(|m| !m.is_empty())
}

/// All options of a tree with their values, in document order
pub fn leaves(tree: &Value) -> Vec<(OptionPath, Value)> {
    let mut out = Vec::new();
    collect_leaves(tree, &OptionPath::default(), &mut out);
    out
}

fn collect_leaves(node: &Value, prefix: &OptionPath, out: &mut Vec<(OptionPath, Value)>) {
    match node.as_mapping() {
        Some(mapping) if !mapping.is_empty() => {
            for (key, child) in mapping {
                if let Some(key) = key.as_str() {
                    collect_leaves(child, &prefix.child(key), out);
                }
            }
        }
        _ if !prefix.is_empty() => out.push((prefix.clone(), node.clone())),
        _ => {}
    }
}

/// Walk `incoming` against `schema` and return one override per option it sets.
///
/// Groups in `incoming` must be mappings (or null, meaning empty). Option
/// values are taken whole, so an option whose default is null may be set to a
/// mapping.
pub fn collect_overrides(
    schema: &Value,
    incoming: &Value,
    context: &str,
) -> ConfigResult<ConfigOptions> {
    let mut out = ConfigOptions::new();
    collect_group(schema, incoming, &OptionPath::default(), context, &mut out)?;
    Ok(out)
}

fn collect_group(
    schema: &Value,
    incoming: &Value,
    prefix: &OptionPath,
    context: &str,
    out: &mut ConfigOptions,
) -> ConfigResult<()> {
    if incoming.is_null() {
        return Ok(());
    }

    let Some(incoming) = incoming.as_mapping() else {
        return Err(ConfigError::InvalidValue {
            context: qualified(context, prefix),
            message: "expected a mapping of options".to_string(),
        });
    };

    let empty = Mapping::new();
    let schema = schema.as_mapping().unwrap_or(&empty);

    for (key, value) in incoming {
        let Some(key) = key.as_str() else {
            return Err(ConfigError::InvalidValue {
                context: qualified(context, prefix),
                message: format!("option names must be strings, got {:?}", key),
            });
        };
        let path = prefix.child(key);

        match schema.get(key) {
            None => {
                return Err(ConfigError::UnknownOption {
                    context: context.to_string(),
                    name: path.to_string(),
                })
            }
            Some(node) if is_group(node) => collect_group(node, value, &path, context, out)?,
            Some(_) => out.insert(path, value.clone()),
        }
    }

    Ok(())
}

fn qualified(context: &str, prefix: &OptionPath) -> String {
    if prefix.is_empty() {
        context.to_string()
    } else {
        format!("{}{}{}", context, OptionPath::SEPARATOR, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        serde_yaml::from_str(
            r#"
app:
  host: localhost
  port: null
multi_dataset:
  dataroot: null
  allowed_matrix_types: []
  matrix_cache:
    max_datasets: 5
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_option_path_parsing() {
        let path = OptionPath::from("multi_dataset__matrix_cache__max_datasets");
        assert_eq!(
            path.segments().to_vec(),
            vec!["multi_dataset", "matrix_cache", "max_datasets"]
        );
        assert_eq!(path.to_string(), "multi_dataset__matrix_cache__max_datasets");

        assert!("app____port".parse::<OptionPath>().is_err());
        assert!("".parse::<OptionPath>().is_err());
        assert!("app__port".parse::<OptionPath>().is_ok());
    }

    #[test]
    fn test_leaves_treat_empty_mappings_and_lists_as_options() {
        let names: Vec<String> = leaves(&schema()).iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "app__host",
                "app__port",
                "multi_dataset__dataroot",
                "multi_dataset__allowed_matrix_types",
                "multi_dataset__matrix_cache__max_datasets",
            ]
        );
    }

    #[test]
    fn test_get_and_set() {
        let mut tree = schema();
        let path = OptionPath::from("multi_dataset__matrix_cache__max_datasets");
        assert_eq!(get(&tree, &path), Some(&Value::from(5)));

        assert!(set(&mut tree, &path, Value::from(9)));
        assert_eq!(get(&tree, &path), Some(&Value::from(9)));

        assert!(!set(&mut tree, &OptionPath::from("missing__group__x"), Value::Null));
    }

    #[test]
    fn test_collect_overrides_takes_option_values_whole() {
        let incoming: Value = serde_yaml::from_str(
            r#"
multi_dataset:
  dataroot:
    d1: /data/d1
app:
"#,
        )
        .unwrap();

        let overrides = collect_overrides(&schema(), &incoming, "server").unwrap();
        assert_eq!(overrides.len(), 1);
        let dataroot = overrides.get(&OptionPath::from("multi_dataset__dataroot")).unwrap();
        assert!(dataroot.is_mapping());
    }

    #[test]
    fn test_collect_overrides_rejects_unknown_keys() {
        let incoming: Value = serde_yaml::from_str("app:\n  hostname: x\n").unwrap();
        let err = collect_overrides(&schema(), &incoming, "server").unwrap_err();
        match err {
            ConfigError::UnknownOption { context, name } => {
                assert_eq!(context, "server");
                assert_eq!(name, "app__hostname");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_collect_overrides_rejects_scalar_groups() {
        let incoming: Value = serde_yaml::from_str("app: 5\n").unwrap();
        assert!(matches!(
            collect_overrides(&schema(), &incoming, "server"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_config_options_last_write_wins() {
        let options = ConfigOptions::new()
            .with("app__port", 5006)
            .with("app__host", "0.0.0.0")
            .with("app__port", 5007);
        assert_eq!(options.len(), 2);
        assert_eq!(options.get(&OptionPath::from("app__port")), Some(&Value::from(5007)));
    }
}
