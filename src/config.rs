use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::value::Value;

/// Global settings for hclscan
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Default input directory if not specified in targets
    pub input: Option<String>,
    /// Default variable files
    #[serde(default)]
    pub var_files: Vec<String>,
    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Configuration for a single target output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Name of the target (for identification)
    pub name: String,

    /// Backend to use for this target
    pub backend: String,

    /// Input directory for this target
    pub input: Option<String>,

    /// Output file path (if not specified, prints to stdout)
    pub output: Option<String>,

    /// Resource types to include (if empty, includes all)
    #[serde(default)]
    pub include: Vec<String>,

    /// Resource types to exclude
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Variables for this target
    #[serde(default)]
    pub vars: HashMap<String, toml::Value>,

    /// Variable files for this target
    #[serde(default)]
    pub var_files: Vec<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,
    /// List of targets to generate
    pub targets: Vec<TargetConfig>,
}

/// Include/exclude lists over materialized resource types.
///
/// A pattern ending in `*` matches by prefix (`aws_s3_*`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl ResourceFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        ResourceFilter { include, exclude }
    }

    pub fn keeps(&self, resource_type: &str) -> bool {
        if self.include.is_empty() && self.exclude.is_empty() {
            true
        } else if !self.include.is_empty() {
            self.include.iter().any(|p| matches_type(p, resource_type))
        } else {
            !self.exclude.iter().any(|p| matches_type(p, resource_type))
        }
    }
}

fn matches_type(pattern: &str, resource_type: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => resource_type.starts_with(prefix),
        None => pattern == resource_type,
    }
}

impl TargetConfig {
    pub fn filter(&self) -> ResourceFilter {
        ResourceFilter::new(self.include.clone(), self.exclude.clone())
    }

    /// Target `vars` converted to interpreter values.
    pub fn variable_values(&self) -> Result<BTreeMap<String, Value>> {
        self.vars
            .iter()
            .map(|(k, v)| Ok((k.clone(), Value::from_toml(v)?)))
            .collect()
    }
}

/// Load configuration from hclscan.toml file
pub fn load_config() -> Result<Option<Config>> {
    load_config_from_path(Path::new("hclscan.toml"))
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[settings]
input = "infra"
var_files = ["common.tfvars"]

[settings.env]
AWS_REGION = "eu-west-1"

[[targets]]
name = "storage"
backend = "json"
output = "storage.json"
include = ["aws_s3_*", "data.aws_iam_policy_document"]

[targets.vars]
env = "prod"
replicas = 3

[[targets]]
name = "ids"
backend = "ids"
exclude = ["aws_iam_role"]
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        assert_eq!(config.settings.input.as_deref(), Some("infra"));
        assert_eq!(config.settings.env["AWS_REGION"], "eu-west-1");
        assert_eq!(config.targets.len(), 2);

        let vars = config.targets[0].variable_values().unwrap();
        assert_eq!(vars["env"], Value::from("prod"));
        assert_eq!(vars["replicas"], Value::from(3));
    }

    #[test]
    fn test_include_wins_and_prefix_patterns() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        let filter = config.targets[0].filter();
        assert!(filter.keeps("aws_s3_bucket"));
        assert!(filter.keeps("data.aws_iam_policy_document"));
        assert!(!filter.keeps("aws_instance"));
    }

    #[test]
    fn test_exclude_and_empty_filters() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        let filter = config.targets[1].filter();
        assert!(!filter.keeps("aws_iam_role"));
        assert!(filter.keeps("aws_iam_policy"));
        assert!(ResourceFilter::default().keeps("anything"));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_from_path(&dir.path().join("hclscan.toml"))
            .unwrap()
            .is_none());
    }
}
