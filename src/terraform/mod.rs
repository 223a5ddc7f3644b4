//! Policy Assembler
//!
//! Turns a validated [`PolicyConfig`] into the Terraform file set:
//!
//! ```text
//! PolicyConfig ──► ResourceNames::derive ──┬─► versions.tf / main.tf
//!                                          ├─► variables.tf / modules.tf
//!                                          ├─► waf_rule_groups.tf  (StatementCompiler per rule)
//!                                          ├─► fms_policy.tf       (count + block variants)
//!                                          └─► outputs.tf
//! ```
//!
//! Rendering is pure and infallible; only [`TerraformBuilder::generate`]
//! touches the filesystem.

pub mod files;
pub mod naming;
pub mod policy;
pub mod rule_groups;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::artifacts::ArtifactSet;
use crate::config::PolicyConfig;
use crate::error::Result;

pub use naming::{sanitize_resource_name, GroupNames, ResourceNames};
pub use policy::{plan_variant, GroupReference, PolicyMember, PolicyPlan, PolicyVariant};

pub const VERSIONS_TF: &str = "versions.tf";
pub const MAIN_TF: &str = "main.tf";
pub const VARIABLES_TF: &str = "variables.tf";
pub const MODULES_TF: &str = "modules.tf";
pub const RULE_GROUPS_TF: &str = "waf_rule_groups.tf";
pub const FMS_POLICY_TF: &str = "fms_policy.tf";
pub const OUTPUTS_TF: &str = "outputs.tf";

/// `<output>/<project>/terraform`
pub fn terraform_dir(output_dir: &Path, project: &str) -> PathBuf {
    output_dir.join(project).join("terraform")
}

/// Rendered files plus the identifiers they were rendered with.
#[derive(Debug, Clone)]
pub struct TerraformArtifacts {
    pub files: ArtifactSet,
    pub names: ResourceNames,
}

pub struct TerraformBuilder<'a> {
    config: &'a PolicyConfig,
    names: ResourceNames,
}

impl<'a> TerraformBuilder<'a> {
    pub fn new(config: &'a PolicyConfig) -> Self {
        Self {
            config,
            names: ResourceNames::derive(config),
        }
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    pub fn build(&self) -> TerraformArtifacts {
        let config = self.config;
        let names = &self.names;

        let mut set = ArtifactSet::new();
        set.insert(VERSIONS_TF, files::render_versions());
        set.insert(MAIN_TF, files::render_main(config));
        set.insert(VARIABLES_TF, files::render_variables(config, names));
        set.insert(MODULES_TF, files::render_modules(config, names));
        set.insert(RULE_GROUPS_TF, rule_groups::render_rule_groups(config, names));
        set.insert(FMS_POLICY_TF, policy::render_fms_policies(config, names));
        set.insert(OUTPUTS_TF, files::render_outputs(config, names));

        TerraformArtifacts {
            files: set,
            names: self.names.clone(),
        }
    }

    /// Render and write the tree under `<output_dir>/<project>/terraform`.
    /// Fails only on I/O.
    pub fn generate(&self, output_dir: &Path) -> Result<PathBuf> {
        let dir = terraform_dir(output_dir, self.config.project());
        info!("Generating Terraform files in {}", dir.display());

        let artifacts = self.build();
        artifacts.files.write_atomic(&dir)?;

        info!("Terraform generation complete");
        Ok(dir)
    }
}

/// Convenience wrapper around [`TerraformBuilder::generate`].
pub fn generate(config: &PolicyConfig, output_dir: &Path) -> Result<PathBuf> {
    TerraformBuilder::new(config).generate(output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_produces_every_file() {
        let config: PolicyConfig = serde_yaml::from_str(
            r#"
version: "1.0"
metadata: {project: donut, policy_name: p, account_id: "123456789012"}
settings: {}
rule_groups:
  common: {type: external, arn_variable: common_arn}
"#,
        )
        .unwrap();

        let artifacts = TerraformBuilder::new(&config).build();
        let paths: Vec<_> = artifacts
            .files
            .paths()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            paths,
            vec![
                FMS_POLICY_TF,
                MAIN_TF,
                MODULES_TF,
                OUTPUTS_TF,
                VARIABLES_TF,
                VERSIONS_TF,
                RULE_GROUPS_TF,
            ]
        );
        assert_eq!(artifacts.names.resource("common"), "common");
    }

    #[test]
    fn test_terraform_dir() {
        assert_eq!(
            terraform_dir(Path::new("out"), "donut"),
            PathBuf::from("out/donut/terraform")
        );
    }
}
