//! FMS policy variants
//!
//! The count and block policies are produced by one builder parameterised by a
//! [`PolicyVariant`]. A variant decides three things per rule group: whether the
//! group is included, which override action applies, and which per-rule action
//! overrides apply. Everything else is shared.
//!
//! Planning ([`plan_variant`]) is separate from rendering so the member list and
//! dependency list can be inspected directly.

use tracing::debug;

use crate::config::{PolicyConfig, RuleActionOverride, RuleGroup, RuleGroupKind, Settings};
use crate::hcl::{bool_lit, quote, HclWriter};
use crate::vocabulary::{DefaultAction, OverrideAction};

use super::naming::ResourceNames;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyVariant {
    /// Observe only.
    Count,
    /// Enforce.
    Block,
}

impl PolicyVariant {
    pub const ALL: [PolicyVariant; 2] = [PolicyVariant::Count, PolicyVariant::Block];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyVariant::Count => "count",
            PolicyVariant::Block => "block",
        }
    }

    fn title(self) -> &'static str {
        match self {
            PolicyVariant::Count => "Count Mode (Monitoring)",
            PolicyVariant::Block => "Block Mode (Enforcement)",
        }
    }

    /// `include_in_count: false` removes a group from the count policy only.
    pub fn includes(self, group: &RuleGroup) -> bool {
        match self {
            PolicyVariant::Count => group.include_in_count,
            PolicyVariant::Block => true,
        }
    }

    pub fn override_action(self, group: &RuleGroup) -> OverrideAction {
        match self {
            PolicyVariant::Count => group.override_action_count,
            PolicyVariant::Block => group.override_action_block,
        }
    }

    pub fn rule_action_overrides(self, group: &RuleGroup) -> &[RuleActionOverride] {
        let overrides = match self {
            PolicyVariant::Count => &group.rule_action_overrides_count,
            PolicyVariant::Block => &group.rule_action_overrides_block,
        };
        overrides.as_deref().unwrap_or_default()
    }

    /// Input variable holding an external group's ARN for this variant.
    pub fn external_arn_variable<'g>(self, group: &'g RuleGroup) -> Option<&'g str> {
        let RuleGroupKind::External {
            arn_variable,
            arn_variable_count,
            arn_variable_block,
        } = &group.kind
        else {
            return None;
        };
        let specific = match self {
            PolicyVariant::Count => arn_variable_count,
            PolicyVariant::Block => arn_variable_block,
        };
        specific
            .as_deref()
            .or(arn_variable.as_deref())
            .filter(|v| !v.is_empty())
    }

    fn exclude_resource_tags(self) -> bool {
        self == PolicyVariant::Count
    }

    fn remediation_enabled(self, settings: &Settings) -> bool {
        match self {
            PolicyVariant::Count => false,
            PolicyVariant::Block => settings.auto_remediation,
        }
    }
}

/// How a policy member points at its rule group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupReference {
    /// A rule group addressed by ARN; the value is an HCL expression.
    RuleGroup { arn: String },
    /// An AWS (or marketplace) managed rule group.
    Managed {
        vendor: String,
        name: String,
        version: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMember {
    /// Config key of the rule group.
    pub group: String,
    pub reference: GroupReference,
    pub override_action: OverrideAction,
    pub rule_action_overrides: Vec<RuleActionOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyPlan {
    pub variant: PolicyVariant,
    pub members: Vec<PolicyMember>,
    /// Terraform addresses the policy must be created after.
    pub depends_on: Vec<String>,
}

/// Resolve the members of one variant, ordered by `order` then key.
pub fn plan_variant(
    config: &PolicyConfig,
    names: &ResourceNames,
    variant: PolicyVariant,
) -> PolicyPlan {
    let mut groups: Vec<(&String, &RuleGroup)> = config
        .rule_groups
        .iter()
        .filter(|(_, group)| variant.includes(group))
        .collect();
    groups.sort_by_key(|(key, group)| (group.sort_order(), *key));

    let mut members = Vec::with_capacity(groups.len());
    let mut depends_on = Vec::new();

    for (key, group) in groups {
        let resource = names.resource(key);
        let reference = match &group.kind {
            RuleGroupKind::Custom { .. } => {
                depends_on.push(format!("aws_wafv2_rule_group.{}", resource));
                GroupReference::RuleGroup {
                    arn: format!("aws_wafv2_rule_group.{}.arn", resource),
                }
            }
            RuleGroupKind::Module { output_arn, .. } => {
                depends_on.push(format!("module.{}", resource));
                GroupReference::RuleGroup {
                    arn: format!("module.{}.{}", resource, output_arn),
                }
            }
            RuleGroupKind::External { .. } => match variant.external_arn_variable(group) {
                Some(var) => GroupReference::RuleGroup {
                    arn: format!("var.{}", var),
                },
                None => {
                    debug!(
                        "External group '{}' has no ARN for the {} policy; skipped",
                        key,
                        variant.as_str()
                    );
                    continue;
                }
            },
            RuleGroupKind::IpSet { .. } => GroupReference::RuleGroup {
                arn: format!("var.{}", ip_set_arn_variable(names, key, group)),
            },
            RuleGroupKind::Managed {
                managed_rule_group,
                vendor,
                version,
            } => GroupReference::Managed {
                vendor: vendor.clone(),
                name: managed_rule_group.clone(),
                version: version.clone(),
            },
        };

        members.push(PolicyMember {
            group: key.clone(),
            reference,
            override_action: variant.override_action(group),
            rule_action_overrides: variant.rule_action_overrides(group).to_vec(),
        });
    }

    PolicyPlan {
        variant,
        members,
        depends_on,
    }
}

/// Input variable carrying the ARN of the rule group built around an IP set.
pub fn ip_set_arn_variable(names: &ResourceNames, key: &str, group: &RuleGroup) -> String {
    match &group.kind {
        RuleGroupKind::IpSet {
            arn_variable: Some(var),
            ..
        } if !var.is_empty() => var.clone(),
        _ => format!("{}_arn", names.resource(key)),
    }
}

/// `defaultSizeInspectionLimit` value for a body size limit in bytes.
pub fn size_inspection_limit(body_size_limit: u64) -> String {
    if body_size_limit >= 1024 {
        format!("KB_{}", body_size_limit / 1024)
    } else {
        "KB_16".to_string()
    }
}

/// Render `fms_policy.tf` with both variants.
pub fn render_fms_policies(config: &PolicyConfig, names: &ResourceNames) -> String {
    let settings = &config.settings;
    let mut out = format!(
        "\
# =============================================================================
# AWS FMS WAFv2 Policies
# Scope: {}
# Resource Type: {}
# =============================================================================
",
        settings.scope, settings.resource_type
    );

    for variant in PolicyVariant::ALL {
        let plan = plan_variant(config, names, variant);
        debug!(
            "{} policy: {} members, {} dependencies",
            variant.as_str(),
            plan.members.len(),
            plan.depends_on.len()
        );
        out.push_str(&format!(
            "
# =============================================================================
# FMS Policy: {}
# =============================================================================

",
            variant.title()
        ));
        out.push_str(&render_policy(config, names, &plan));
    }
    out
}

fn render_policy(config: &PolicyConfig, names: &ResourceNames, plan: &PolicyPlan) -> String {
    let settings = &config.settings;
    let variant = plan.variant.as_str();
    let mut w = HclWriter::new();

    w.open(format!(
        "resource \"aws_fms_policy\" {}",
        quote(names.policy(plan.variant))
    ));
    w.attrs(&[
        (
            "name",
            format!(
                "\"custom_${{var.service_name}}_global_{}_version_${{var.policy_version}}\"",
                variant
            ),
        ),
        ("resource_type", quote(&settings.resource_type)),
        ("delete_all_policy_resources", "true".to_string()),
        ("delete_unused_fm_managed_resources", "true".to_string()),
        (
            "exclude_resource_tags",
            bool_lit(plan.variant.exclude_resource_tags()).to_string(),
        ),
        (
            "remediation_enabled",
            bool_lit(plan.variant.remediation_enabled(settings)).to_string(),
        ),
    ]);

    w.blank();
    w.open("resource_tags =");
    w.attr(
        format!(
            "\"FMManagedWebACLWAFV2-custom_${{var.service_name}}_global_{}\"",
            variant
        ),
        "\"v${var.policy_version}\"",
    );
    w.close();

    w.blank();
    w.open("security_service_policy_data");
    w.attr("type", "\"WAFV2\"");
    w.blank();
    w.open_line("managed_service_data = jsonencode({");
    render_service_data(&mut w, config, plan);
    w.close_line("})");
    w.close();

    w.blank();
    w.open("include_map");
    w.attr("account", "[var.default_account]");
    w.close();

    w.blank();
    w.open("lifecycle");
    w.attr("ignore_changes", "[include_map, tags]");
    w.close();

    if !plan.depends_on.is_empty() {
        w.blank();
        w.open_line("depends_on = [");
        let last = plan.depends_on.len() - 1;
        for (i, address) in plan.depends_on.iter().enumerate() {
            w.line(if i < last {
                format!("{},", address)
            } else {
                address.clone()
            });
        }
        w.close_line("]");
    }

    w.close();
    w.finish()
}

fn render_service_data(w: &mut HclWriter, config: &PolicyConfig, plan: &PolicyPlan) {
    let settings = &config.settings;

    w.attrs(&[
        ("type", "\"WAFV2\""),
        ("customRequestHandling", "null"),
        ("customResponse", "null"),
        ("loggingConfiguration", "null"),
        ("optimizeUnassociatedWebACL", "false"),
    ]);

    w.blank();
    w.open("associationConfig =");
    w.open("requestBody =");
    w.open(format!("{} =", settings.scope));
    w.attr(
        "defaultSizeInspectionLimit",
        quote(&size_inspection_limit(settings.body_size_limit)),
    );
    w.close();
    w.close();
    w.close();

    w.blank();
    if plan.members.is_empty() {
        w.attr("preProcessRuleGroups", "[]");
    } else {
        w.open_line("preProcessRuleGroups = [");
        let last = plan.members.len() - 1;
        for (i, member) in plan.members.iter().enumerate() {
            render_member(w, member);
            w.close_line(if i < last { "}," } else { "}" });
        }
        w.close_line("]");
    }

    w.blank();
    w.attr("postProcessRuleGroups", "[]");

    w.blank();
    let default_action = match settings.default_action {
        Some(DefaultAction::Block) => "BLOCK",
        _ => "ALLOW",
    };
    w.open("defaultAction =");
    w.attr("type", quote(default_action));
    w.close();

    w.blank();
    w.attrs(&[
        ("overrideCustomerWebACLAssociation", "false"),
        ("sampledRequestsEnabledForDefaultActions", "false"),
    ]);
}

/// Width of the widest member key, `managedRuleGroupIdentifier`.
const MEMBER_KEY_WIDTH: usize = 26;

/// Opens the member object; the caller closes it.
fn render_member(w: &mut HclWriter, member: &PolicyMember) {
    w.open_line("{");
    match &member.reference {
        GroupReference::RuleGroup { arn } => {
            w.attr_padded("ruleGroupType", quote("RuleGroup"), MEMBER_KEY_WIDTH);
            w.attr_padded("ruleGroupArn", arn, MEMBER_KEY_WIDTH);
            w.attr_padded("sampledRequestsEnabled", "true", MEMBER_KEY_WIDTH);
            w.attr_padded("excludeRules", "[]", MEMBER_KEY_WIDTH);
            w.attr_padded("managedRuleGroupIdentifier", "null", MEMBER_KEY_WIDTH);
        }
        GroupReference::Managed {
            vendor,
            name,
            version,
        } => {
            w.attr_padded("ruleGroupType", quote("ManagedRuleGroup"), MEMBER_KEY_WIDTH);
            w.attr_padded("ruleGroupArn", "null", MEMBER_KEY_WIDTH);
            w.attr_padded("sampledRequestsEnabled", "true", MEMBER_KEY_WIDTH);
            w.attr_padded("excludeRules", "[]", MEMBER_KEY_WIDTH);
            w.open("managedRuleGroupIdentifier =");
            w.attrs(&[
                ("vendorName", quote(vendor)),
                ("managedRuleGroupName", quote(name)),
                (
                    "version",
                    version.as_deref().map(quote).unwrap_or_else(|| "null".to_string()),
                ),
            ]);
            w.close();
        }
    }

    w.open("overrideAction =");
    w.attr("type", quote(member.override_action.as_str()));
    w.close();

    if !member.rule_action_overrides.is_empty() {
        w.open_line("ruleActionOverrides = [");
        for entry in &member.rule_action_overrides {
            w.open_line("{");
            w.attr("name", quote(&entry.name));
            w.open("actionToUse =");
            w.empty_block(format!("{} =", entry.action));
            w.close();
            w.close_line("},");
        }
        w.close_line("]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(yaml: &str) -> PolicyConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const MIXED: &str = r#"
version: "1.0"
metadata: {project: donut, policy_name: p, account_id: "123456789012"}
settings: {scope: CLOUDFRONT, auto_remediation: false}
rule_groups:
  zeta_common:
    type: external
    order: 1
    arn_variable_count: common_count_arn
    arn_variable_block: common_block_arn
  bots:
    type: custom
    order: 3
    include_in_count: false
    override_action_block: COUNT
    rules:
      - name: r
        action: block
        statement: {or_methods: [GET]}
  catch_all:
    type: module
    order: 2
    module_source: ../modules/catch
    output_arn: rule_group_arn
    rule_action_overrides_block:
      - {name: CatchAll, action: count}
  office:
    type: ip_set
    ip_addresses: [10.0.0.0/8]
  baseline:
    type: managed
    order: 4
    managed_rule_group: AWSManagedRulesCommonRuleSet
"#;

    fn arns(plan: &PolicyPlan) -> Vec<String> {
        plan.members
            .iter()
            .map(|m| match &m.reference {
                GroupReference::RuleGroup { arn } => arn.clone(),
                GroupReference::Managed { name, .. } => name.clone(),
            })
            .collect()
    }

    #[test]
    fn test_variants_differ_only_where_configured() {
        let config = config(MIXED);
        let names = ResourceNames::derive(&config);
        let count = plan_variant(&config, &names, PolicyVariant::Count);
        let block = plan_variant(&config, &names, PolicyVariant::Block);

        assert_eq!(
            arns(&count),
            vec![
                "var.common_count_arn",
                "module.catch_all.rule_group_arn",
                "AWSManagedRulesCommonRuleSet",
                "var.office_arn",
            ]
        );
        assert_eq!(
            arns(&block),
            vec![
                "var.common_block_arn",
                "module.catch_all.rule_group_arn",
                "aws_wafv2_rule_group.bots.arn",
                "AWSManagedRulesCommonRuleSet",
                "var.office_arn",
            ]
        );

        assert_eq!(count.depends_on, vec!["module.catch_all"]);
        assert_eq!(
            block.depends_on,
            vec!["module.catch_all", "aws_wafv2_rule_group.bots"]
        );

        let bots = &block.members[2];
        assert_eq!(bots.override_action, OverrideAction::Count);
        assert!(count.members.iter().all(|m| m.group != "bots"));

        assert!(count.members[1].rule_action_overrides.is_empty());
        assert_eq!(block.members[1].rule_action_overrides.len(), 1);
    }

    #[test]
    fn test_external_without_variant_arn_is_skipped() {
        let config = config(
            r#"
version: "1.0"
metadata: {project: donut, policy_name: p, account_id: "123456789012"}
settings: {}
rule_groups:
  split: {type: external, arn_variable_count: only_count}
"#,
        );
        let names = ResourceNames::derive(&config);
        assert_eq!(plan_variant(&config, &names, PolicyVariant::Count).members.len(), 1);
        assert!(plan_variant(&config, &names, PolicyVariant::Block).members.is_empty());
    }

    #[test]
    fn test_size_inspection_limit() {
        assert_eq!(size_inspection_limit(65536), "KB_64");
        assert_eq!(size_inspection_limit(16384), "KB_16");
        assert_eq!(size_inspection_limit(512), "KB_16");
    }

    #[test]
    fn test_renders_count_policy() {
        let config = config(
            r#"
version: "1.0"
metadata: {project: donut, policy_name: p, account_id: "123456789012"}
settings: {scope: CLOUDFRONT, default_action: block}
rule_groups:
  common:
    type: external
    arn_variable: common_arn
    rule_action_overrides_count:
      - {name: SizeRestrictions_BODY, action: count}
  baseline:
    type: managed
    managed_rule_group: AWSManagedRulesCommonRuleSet
    version: Version_1.4
"#,
        );
        let names = ResourceNames::derive(&config);
        let plan = plan_variant(&config, &names, PolicyVariant::Count);
        let hcl = render_policy(&config, &names, &plan);

        let expected = r#"resource "aws_fms_policy" "count" {
  name                               = "custom_${var.service_name}_global_count_version_${var.policy_version}"
  resource_type                      = "AWS::CloudFront::Distribution"
  delete_all_policy_resources        = true
  delete_unused_fm_managed_resources = true
  exclude_resource_tags              = true
  remediation_enabled                = false

  resource_tags = {
    "FMManagedWebACLWAFV2-custom_${var.service_name}_global_count" = "v${var.policy_version}"
  }

  security_service_policy_data {
    type = "WAFV2"

    managed_service_data = jsonencode({
      type                       = "WAFV2"
      customRequestHandling      = null
      customResponse             = null
      loggingConfiguration       = null
      optimizeUnassociatedWebACL = false

      associationConfig = {
        requestBody = {
          CLOUDFRONT = {
            defaultSizeInspectionLimit = "KB_64"
          }
        }
      }

      preProcessRuleGroups = [
        {
          ruleGroupType              = "ManagedRuleGroup"
          ruleGroupArn               = null
          sampledRequestsEnabled     = true
          excludeRules               = []
          managedRuleGroupIdentifier = {
            vendorName           = "AWS"
            managedRuleGroupName = "AWSManagedRulesCommonRuleSet"
            version              = "Version_1.4"
          }
          overrideAction = {
            type = "NONE"
          }
        },
        {
          ruleGroupType              = "RuleGroup"
          ruleGroupArn               = var.common_arn
          sampledRequestsEnabled     = true
          excludeRules               = []
          managedRuleGroupIdentifier = null
          overrideAction = {
            type = "NONE"
          }
          ruleActionOverrides = [
            {
              name = "SizeRestrictions_BODY"
              actionToUse = {
                count = {}
              }
            },
          ]
        }
      ]

      postProcessRuleGroups = []

      defaultAction = {
        type = "BLOCK"
      }

      overrideCustomerWebACLAssociation       = false
      sampledRequestsEnabledForDefaultActions = false
    })
  }

  include_map {
    account = [var.default_account]
  }

  lifecycle {
    ignore_changes = [include_map, tags]
  }
}
"#;
        assert_eq!(hcl, expected);
    }
}
