//! Configuration loader
//!
//! Reads a policy YAML file into an untyped document for the validator, and
//! converts a validated document into [`PolicyConfig`].

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, info};

use super::types::PolicyConfig;
use crate::error::{PolicyError, Result};

pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the document. Fails on unreadable paths and malformed YAML;
    /// everything else is the validator's business.
    pub fn load_document(&self) -> Result<Value> {
        info!("Loading policy configuration from {}", self.path.display());

        let content =
            std::fs::read_to_string(&self.path).map_err(|source| PolicyError::ConfigRead {
                path: self.path.clone(),
                source,
            })?;

        let document = Self::parse_document(&content).map_err(|source| {
            PolicyError::ConfigParse {
                path: self.path.clone(),
                source,
            }
        })?;

        debug!(
            "Parsed {} top-level keys",
            document.as_mapping().map(|m| m.len()).unwrap_or(0)
        );
        Ok(document)
    }

    pub fn parse_document(content: &str) -> std::result::Result<Value, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Convert a validated document into the typed model.
    pub fn into_typed(document: Value) -> Result<PolicyConfig> {
        let config =
            PolicyConfig::from_value(document).map_err(|e| PolicyError::Schema(e.to_string()))?;

        info!(
            "Loaded policy '{}' for project '{}' with {} rule groups",
            config.metadata.policy_name,
            config.metadata.project,
            config.rule_groups.len()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_creation() {
        let loader = ConfigLoader::new("configs/donut.yaml");
        assert_eq!(loader.path(), Path::new("configs/donut.yaml"));
    }

    #[test]
    fn test_missing_file_is_config_load_error() {
        let err = ConfigLoader::new("/definitely/not/here.yaml")
            .load_document()
            .unwrap_err();
        assert!(err.is_config_load());
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }

    #[test]
    fn test_malformed_yaml_is_config_load_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version: [1.0\nmetadata: {{").unwrap();

        let err = ConfigLoader::new(file.path()).load_document().unwrap_err();
        assert!(matches!(err, PolicyError::ConfigParse { .. }));
    }

    #[test]
    fn test_into_typed_reports_schema_errors() {
        let document = ConfigLoader::parse_document("version: '1.0'\nmetadata: {}\n").unwrap();
        let err = ConfigLoader::into_typed(document).unwrap_err();
        assert!(matches!(err, PolicyError::Schema(_)));
    }
}
