//! Resource identifier derivation.
//!
//! Every generated identifier is derived once, up front, into [`ResourceNames`].
//! The same value then feeds the rule-group blocks, the policy members, the
//! dependency lists and the outputs, so a group is always referred to by the
//! identifier its own block declares.

use std::collections::BTreeMap;

use crate::config::PolicyConfig;
use crate::template::expand_project;

use super::policy::PolicyVariant;

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_resource_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// CloudWatch metric name: alphanumerics only.
pub fn metric_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Project name without a trailing version suffix (`donut_v8` → `donut`).
pub fn service_name(project: &str) -> String {
    let digits = project
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 {
        return project.to_string();
    }

    let stem = &project[..project.len() - digits];
    match stem.strip_suffix('v') {
        Some(base) if !base.is_empty() => base
            .strip_suffix(['-', '_'])
            .filter(|b| !b.is_empty())
            .unwrap_or(base)
            .to_string(),
        _ => project.to_string(),
    }
}

/// `v3` → `3`.
pub fn policy_version_number(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNames {
    /// Display name with `${project}` expanded.
    pub display: String,
    /// Sanitized Terraform identifier.
    pub resource: String,
}

/// Names for the group stored under `key`: its configured `name` (or the key)
/// with `${project}` expanded, then sanitized.
pub fn group_names(key: &str, name: Option<&str>, project: &str) -> GroupNames {
    let display = expand_project(name.unwrap_or(key), project);
    let resource = sanitize_resource_name(&display);
    GroupNames { display, resource }
}

/// Derived identifiers for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    groups: BTreeMap<String, GroupNames>,
    fms_count: String,
    fms_block: String,
}

impl ResourceNames {
    pub fn derive(config: &PolicyConfig) -> Self {
        let project = config.project();

        let groups = config
            .rule_groups
            .iter()
            .map(|(key, group)| (key.clone(), group_names(key, group.name.as_deref(), project)))
            .collect();

        let settings = &config.settings;
        Self {
            groups,
            fms_count: sanitize_resource_name(&expand_project(
                &settings.fms_policy_count_resource_name,
                project,
            )),
            fms_block: sanitize_resource_name(&expand_project(
                &settings.fms_policy_block_resource_name,
                project,
            )),
        }
    }

    pub fn group(&self, key: &str) -> Option<&GroupNames> {
        self.groups.get(key)
    }

    /// Terraform identifier for the group stored under `key`.
    pub fn resource<'a>(&'a self, key: &'a str) -> &'a str {
        self.groups
            .get(key)
            .map(|names| names.resource.as_str())
            .unwrap_or(key)
    }

    pub fn display<'a>(&'a self, key: &'a str) -> &'a str {
        self.groups
            .get(key)
            .map(|names| names.display.as_str())
            .unwrap_or(key)
    }

    /// `aws_fms_policy` identifier for a variant.
    pub fn policy(&self, variant: PolicyVariant) -> &str {
        match variant {
            PolicyVariant::Count => &self.fms_count,
            PolicyVariant::Block => &self.fms_block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_resource_name() {
        assert_eq!(sanitize_resource_name("My Group!!"), "My_Group__");
        assert_eq!(sanitize_resource_name("donut-v8-bots"), "donut_v8_bots");
        assert_eq!(sanitize_resource_name("already_fine_01"), "already_fine_01");
    }

    #[test]
    fn test_metric_name() {
        assert_eq!(metric_name("Block-Bad Bots_1"), "BlockBadBots1");
    }

    #[test]
    fn test_service_name_strips_version_suffix() {
        assert_eq!(service_name("donut_v8"), "donut");
        assert_eq!(service_name("donut-v12"), "donut");
        assert_eq!(service_name("donutv3"), "donut");
        assert_eq!(service_name("donut"), "donut");
        assert_eq!(service_name("web2"), "web2");
        assert_eq!(service_name("v8"), "v8");
        assert_eq!(service_name("river"), "river");
    }

    #[test]
    fn test_policy_version_number() {
        assert_eq!(policy_version_number("v3"), "3");
        assert_eq!(policy_version_number("7"), "7");
    }

    #[test]
    fn test_derive_expands_project_then_sanitizes() {
        let config: PolicyConfig = serde_yaml::from_str(
            r#"
version: "1.0"
metadata: {project: donut_v8, policy_name: p, account_id: "123456789012"}
settings:
  fms_policy_count_resource_name: "${project}-count"
rule_groups:
  bots:
    name: "${project}-bot control"
    type: external
    arn_variable: bots_arn
  plain: {type: external, arn_variable: plain_arn}
"#,
        )
        .unwrap();

        let names = ResourceNames::derive(&config);
        assert_eq!(names.display("bots"), "donut_v8-bot control");
        assert_eq!(names.resource("bots"), "donut_v8_bot_control");
        assert_eq!(names.resource("plain"), "plain");
        assert_eq!(names.policy(PolicyVariant::Count), "donut_v8_count");
        assert_eq!(names.policy(PolicyVariant::Block), "block");

        // unknown keys fall back to themselves, whatever they borrow from
        let key = String::from("not-a-group");
        assert_eq!(names.resource(&key), "not-a-group");
        assert_eq!(names.display(&key), "not-a-group");
    }

    #[test]
    fn test_group_names() {
        let names = group_names("edge", Some("${project} Edge!"), "donut");
        assert_eq!(names.display, "donut Edge!");
        assert_eq!(names.resource, "donut_Edge_");
        assert_eq!(group_names("a-b", None, "donut").resource, "a_b");
    }
}
