//! `aws_wafv2_rule_group` blocks for `custom` rule groups.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::{CustomResponse, PolicyConfig, Rule, RuleGroup, RuleGroupKind};
use crate::hcl::{quote, HclWriter};
use crate::statement::StatementCompiler;
use crate::template::expand_account_id;
use crate::vocabulary::{RuleAction, RuleGroupType, Scope};

use super::naming::{metric_name, sanitize_resource_name, ResourceNames};

const HEADER: &str = "\
# =============================================================================
# Custom Rule Groups (Project-Specific)
# =============================================================================
";

/// Render `waf_rule_groups.tf`.
pub fn render_rule_groups(config: &PolicyConfig, names: &ResourceNames) -> String {
    let blocks: Vec<String> = config
        .groups_of(RuleGroupType::Custom)
        .map(|(key, group)| render_rule_group(config, names, key, group))
        .collect();

    if blocks.is_empty() {
        return "# No custom rule groups defined\n".to_string();
    }

    let mut out = String::from(HEADER);
    for block in blocks {
        out.push('\n');
        out.push_str(&block);
    }
    out
}

/// One `aws_wafv2_rule_group` resource. Non-custom groups render as nothing.
pub fn render_rule_group(
    config: &PolicyConfig,
    names: &ResourceNames,
    key: &str,
    group: &RuleGroup,
) -> String {
    let RuleGroupKind::Custom {
        rules,
        capacity,
        namespace,
    } = &group.kind
    else {
        return String::new();
    };
    debug!("Rendering custom rule group '{}' ({} rules)", key, rules.len());

    let display = names.display(key);
    let mut w = HclWriter::new();
    w.open(format!(
        "resource \"aws_wafv2_rule_group\" {}",
        quote(names.resource(key))
    ));

    let mut header: Vec<(&str, String)> = Vec::with_capacity(5);
    if config.settings.scope == Scope::Cloudfront {
        header.push(("provider", "aws.waf".to_string()));
    }
    header.push(("name", quote(display)));
    if let Some(description) = &group.description {
        header.push(("description", quote(description)));
    }
    header.push(("scope", "local.scope".to_string()));
    header.push(("capacity", capacity.to_string()));
    w.attrs(&header);

    for body_key in referenced_body_keys(rules) {
        let Some(body) = config.custom_response_bodies.get(body_key) else {
            continue;
        };
        w.blank();
        w.open("custom_response_body");
        w.attrs(&[
            ("key", quote(body_key)),
            ("content", quote(&body.content)),
            ("content_type", quote(body.content_type.as_str())),
        ]);
        w.close();
    }

    let compiler = StatementCompiler::new(config);
    for rule in sorted_rules(rules) {
        w.blank();
        render_rule(&mut w, &compiler, config, namespace, rule);
    }

    w.blank();
    visibility_config(&mut w, &sanitize_resource_name(display));

    w.blank();
    w.open_line("tags = merge(var.tags, {");
    w.attrs(&[
        ("Name", quote(display)),
        ("Environment", "var.environment".to_string()),
        ("Project", "var.project".to_string()),
    ]);
    w.close_line("})");
    w.close();

    w.finish()
}

/// Rules in ascending priority. Stable, so equal priorities keep source order.
pub fn sorted_rules(rules: &[Rule]) -> Vec<&Rule> {
    let mut sorted: Vec<&Rule> = rules.iter().collect();
    sorted.sort_by_key(|rule| rule.priority);
    sorted
}

fn referenced_body_keys(rules: &[Rule]) -> BTreeSet<&str> {
    rules
        .iter()
        .filter_map(|rule| rule.custom_response.as_ref())
        .filter_map(|response| response.custom_response_body_key.as_deref())
        .collect()
}

fn render_rule(
    w: &mut HclWriter,
    compiler: &StatementCompiler<'_>,
    config: &PolicyConfig,
    namespace: &str,
    rule: &Rule,
) {
    debug!(
        "Compiling rule '{}' ({} match conditions)",
        rule.name,
        rule.statement.leaf_count()
    );
    w.open("rule");
    w.attrs(&[
        ("name", quote(&rule.name)),
        ("priority", rule.priority.to_string()),
    ]);

    w.blank();
    render_action(w, rule.action, rule.custom_response.as_ref());

    w.blank();
    w.open("statement");
    compiler.emit(w, &rule.statement);
    w.close();

    if let Some(label) = rule.label.as_deref().filter(|l| !l.is_empty()) {
        let label = expand_account_id(label, &config.metadata.account_id);
        w.blank();
        w.open("rule_label");
        w.attr("name", quote(&format!("{}:{}", namespace, label)));
        w.close();
    }

    w.blank();
    visibility_config(w, &metric_name(&rule.name));
    w.close();
}

/// `none` has no WAF counterpart and renders as `allow`. A custom response is
/// only meaningful on `block`.
fn render_action(w: &mut HclWriter, action: RuleAction, response: Option<&CustomResponse>) {
    w.open("action");
    match (action, response) {
        (RuleAction::Block, Some(response)) => {
            w.open("block");
            w.open("custom_response");
            let mut attrs = vec![("response_code", response.response_code.to_string())];
            if let Some(key) = &response.custom_response_body_key {
                attrs.push(("custom_response_body_key", quote(key)));
            }
            w.attrs(&attrs);
            w.close();
            w.close();
        }
        (RuleAction::Block, None) => w.empty_block("block"),
        (RuleAction::Count, _) => w.empty_block("count"),
        (RuleAction::Allow | RuleAction::None, _) => w.empty_block("allow"),
    }
    w.close();
}

fn visibility_config(w: &mut HclWriter, metric: &str) {
    w.open("visibility_config");
    w.attrs(&[
        ("cloudwatch_metrics_enabled", "true".to_string()),
        ("metric_name", quote(metric)),
        ("sampled_requests_enabled", "true".to_string()),
    ]);
    w.close();
}
