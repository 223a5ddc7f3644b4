//! Supporting Terraform files: providers, variables, modules and outputs.

use std::collections::BTreeSet;

use serde_yaml::Value;

use crate::config::{PolicyConfig, RuleGroupKind};
use crate::hcl::{bool_lit, quote, HclWriter};
use crate::vocabulary::{RuleGroupType, Scope};

use super::naming::{policy_version_number, service_name, ResourceNames};
use super::policy::{ip_set_arn_variable, PolicyVariant};

const RULE: &str = "# =============================================================================";

/// Default namespace handed to module-built rule groups for their labels.
pub const OWASP_LABEL_NAMESPACE: &str = "abcd:cyber:custom:owasp";

fn section(title: &str) -> String {
    format!("{}\n# {}\n{}\n", RULE, title, RULE)
}

pub fn render_versions() -> String {
    let mut w = HclWriter::new();
    w.open("terraform");
    w.attr("required_version", quote(">= 1.0"));
    w.blank();
    w.open("required_providers");
    w.open("aws =");
    w.attrs(&[("source", quote("hashicorp/aws")), ("version", quote(">= 5.0"))]);
    w.close();
    w.close();
    w.close();
    w.finish()
}

pub fn render_main(config: &PolicyConfig) -> String {
    let scope = config.settings.scope;
    let mut w = HclWriter::new();
    w.line("# WAF Policy Configuration");
    w.line(format!("# Scope: {}", scope));
    w.blank();
    w.open("locals");
    w.attr("scope", quote(scope.as_str()));
    w.close();
    w.blank();
    w.empty_block("data \"aws_region\" \"current\"");
    w.empty_block("data \"aws_caller_identity\" \"current\"");
    w.blank();

    if scope == Scope::Cloudfront {
        w.line("# CloudFront WAF must be deployed in us-east-1");
        w.open("provider \"aws\"");
        w.attrs(&[("region", quote("us-east-1")), ("alias", quote("waf"))]);
        w.close();
        w.blank();
    }
    w.open("provider \"aws\"");
    w.attr("region", "var.aws_region");
    w.close();
    w.finish()
}

fn variable(w: &mut HclWriter, name: &str, description: &str, kind: &str, default: Option<String>) {
    w.open(format!("variable {}", quote(name)));
    let mut attrs = vec![
        ("description", quote(description)),
        ("type", kind.to_string()),
    ];
    if let Some(default) = default {
        attrs.push(("default", default));
    }
    w.attrs(&attrs);
    w.close();
    w.blank();
}

pub fn render_variables(config: &PolicyConfig, names: &ResourceNames) -> String {
    let metadata = &config.metadata;
    let project = config.project();

    let mut w = HclWriter::new();
    w.push_raw(&section("Base Variables"));
    w.blank();

    let base: [(&str, &str, String); 8] = [
        ("aws_region", "AWS region", "ap-east-1".to_string()),
        ("environment", "Environment name", metadata.environment.clone()),
        ("project", "Project name", project.to_string()),
        (
            "service_name",
            "Service name for FMS policy",
            service_name(project),
        ),
        (
            "policy_version",
            "Policy version number",
            policy_version_number(&metadata.policy_version).to_string(),
        ),
        ("account_id", "AWS Account ID", metadata.account_id.clone()),
        (
            "default_account",
            "Default account for FMS policy",
            metadata.account_id.clone(),
        ),
        (
            "fms_admin_account",
            "FMS Admin Account ID",
            config.settings.fms_admin_account.clone(),
        ),
    ];
    for (name, description, default) in &base {
        variable(&mut w, name, description, "string", Some(quote(default)));
    }
    variable(
        &mut w,
        "owasp_rule_label_namespace",
        "OWASP rule label namespace",
        "string",
        Some(quote(OWASP_LABEL_NAMESPACE)),
    );
    variable(
        &mut w,
        "tags",
        "Additional tags",
        "map(string)",
        Some("{}".to_string()),
    );

    w.push_raw(&section("External Rule Group ARN Variables (Common Modules)"));
    w.blank();

    // Groups may share an ARN input; declare each variable once.
    let mut declared: BTreeSet<String> = BTreeSet::new();
    let mut declare = |w: &mut HclWriter, name: &str, description: String| {
        if declared.insert(name.to_string()) {
            variable(w, name, &description, "string", None);
        }
    };

    for (key, group) in &config.rule_groups {
        let description = group
            .description
            .clone()
            .unwrap_or_else(|| format!("ARN for {}", key));
        match &group.kind {
            RuleGroupKind::External {
                arn_variable,
                arn_variable_count,
                arn_variable_block,
            } => {
                if let Some(var) = arn_variable {
                    declare(&mut w, var.as_str(), description.clone());
                }
                if let Some(var) = arn_variable_count {
                    declare(&mut w, var.as_str(), format!("{} (count policy)", description));
                }
                if let Some(var) = arn_variable_block {
                    declare(&mut w, var.as_str(), format!("{} (block policy)", description));
                }
            }
            RuleGroupKind::IpSet { .. } => {
                let var = ip_set_arn_variable(names, key, group);
                declare(&mut w, var.as_str(), format!("{} (IP set rule group)", description));
            }
            _ => {}
        }
    }

    w.finish()
}

/// Module argument value. Strings naming Terraform objects (`aws_*`, `module.*`)
/// are emitted as references, everything else as a literal.
pub fn module_param_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => bool_lit(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if s.starts_with("aws_") || s.starts_with("module.") => s.clone(),
        Value::String(s) => quote(s),
        Value::Sequence(items) => format!(
            "[{}]",
            items
                .iter()
                .map(module_param_value)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Value::Mapping(map) => {
            if map.is_empty() {
                return "{}".to_string();
            }
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::String(s) => s.clone(),
                        other => module_param_value(other),
                    };
                    format!("{} = {}", key, module_param_value(v))
                })
                .collect();
            format!("{{ {} }}", entries.join(", "))
        }
        Value::Tagged(tagged) => module_param_value(&tagged.value),
    }
}

pub fn render_modules(config: &PolicyConfig, names: &ResourceNames) -> String {
    let mut blocks = Vec::new();

    for (key, group) in config.groups_of(RuleGroupType::Module) {
        let RuleGroupKind::Module {
            module_source,
            module_params,
            ..
        } = &group.kind
        else {
            continue;
        };

        let mut attrs: Vec<(String, String)> = vec![("source".to_string(), quote(module_source))];
        attrs.extend(
            module_params
                .iter()
                .map(|(name, value)| (name.clone(), module_param_value(value))),
        );
        attrs.push(("scope".to_string(), "local.scope".to_string()));
        attrs.push(("tags".to_string(), "var.tags".to_string()));
        attrs.push((
            "owasp_rule_label_namespace".to_string(),
            "var.owasp_rule_label_namespace".to_string(),
        ));

        let mut w = HclWriter::new();
        w.open(format!("module {}", quote(names.resource(key))));
        w.attrs(&attrs);
        w.close();
        blocks.push(w.finish());
    }

    if blocks.is_empty() {
        return "# No module references defined\n".to_string();
    }
    format!("{}\n{}", section("Custom Catch Modules"), blocks.join("\n"))
}

fn output(w: &mut HclWriter, name: &str, description: &str, value: &str) {
    w.open(format!("output {}", quote(name)));
    w.attrs(&[("description", quote(description)), ("value", value.to_string())]);
    w.close();
}

pub fn render_outputs(config: &PolicyConfig, names: &ResourceNames) -> String {
    let mut w = HclWriter::new();
    w.push_raw(&section("Outputs"));
    w.blank();

    if config.groups_of(RuleGroupType::Custom).next().is_some() {
        w.line("# Custom Rule Group Outputs");
        w.open("output \"rule_group_arns\"");
        w.attr("description", quote("ARNs of all custom rule groups"));
        w.open("value =");
        w.line("for k, v in aws_wafv2_rule_group : k => v.arn");
        w.close();
        w.close();
        w.blank();
    }

    for (key, group) in config.groups_of(RuleGroupType::Module) {
        if let RuleGroupKind::Module { output_arn, .. } = &group.kind {
            let resource = names.resource(key);
            output(
                &mut w,
                &format!("{}_arn", resource),
                &format!("ARN of {} module", key),
                &format!("module.{}.{}", resource, output_arn),
            );
            w.blank();
        }
    }

    w.line("# FMS Policy Outputs");
    let mut first = true;
    for variant in PolicyVariant::ALL {
        let policy = names.policy(variant);
        for attribute in ["id", "arn"] {
            if !first {
                w.blank();
            }
            first = false;
            output(
                &mut w,
                &format!("fms_policy_{}_{}", variant.as_str(), attribute),
                &format!(
                    "The {} of the FMS {} policy",
                    attribute.to_uppercase(),
                    variant.as_str()
                ),
                &format!("aws_fms_policy.{}.{}", policy, attribute),
            );
        }
    }

    w.finish()
}
