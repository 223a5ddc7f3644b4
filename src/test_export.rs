//! Test definition export
//!
//! The test-runner generator is a separate tool. This module hands it the
//! validated `test_definitions` section as JSON, with enough policy context to
//! name its output, under `<output>/<project>/tests/`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::PolicyConfig;
use crate::error::{PolicyError, Result};

pub const TEST_DEFINITIONS_JSON: &str = "test_definitions.json";

/// `<output>/<project>/tests`
pub fn tests_dir(output_dir: &Path, project: &str) -> PathBuf {
    output_dir.join(project).join("tests")
}

#[derive(Debug, Serialize)]
struct TestExport<'a> {
    project: &'a str,
    policy_name: &'a str,
    account_id: &'a str,
    scope: &'a str,
    test_definitions: &'a serde_yaml::Value,
}

/// Render the export document. `None` when the config has no test definitions.
pub fn render_test_definitions(config: &PolicyConfig) -> Result<Option<String>> {
    let Some(definitions) = config.test_definitions.as_ref().filter(|v| !v.is_null()) else {
        return Ok(None);
    };

    let export = TestExport {
        project: &config.metadata.project,
        policy_name: &config.metadata.policy_name,
        account_id: &config.metadata.account_id,
        scope: config.settings.scope.as_str(),
        test_definitions: definitions,
    };

    let mut json = serde_json::to_string_pretty(&export)
        .map_err(|e| PolicyError::Serialization(e.to_string()))?;
    json.push('\n');
    Ok(Some(json))
}

/// Write the export. Returns the tests directory, or `None` when there was
/// nothing to export.
///
/// Only `test_definitions.json` is replaced (via a temp file renamed over it);
/// whatever the test-runner generator has written next to it is left alone.
pub fn export_test_definitions(config: &PolicyConfig, output_dir: &Path) -> Result<Option<PathBuf>> {
    let Some(json) = render_test_definitions(config)? else {
        info!("No test_definitions found, skipping test export");
        return Ok(None);
    };

    let dir = tests_dir(output_dir, config.project());
    fs::create_dir_all(&dir).map_err(|e| PolicyError::io(&dir, e))?;

    let path = dir.join(TEST_DEFINITIONS_JSON);
    let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(|e| PolicyError::io(&dir, e))?;
    file.write_all(json.as_bytes()).map_err(|e| PolicyError::io(&path, e))?;
    file.persist(&path).map_err(|e| PolicyError::io(&path, e.error))?;

    info!("Exported test definitions to {}", dir.display());
    Ok(Some(dir))
}
