//! Typed policy configuration
//!
//! The shape a validated YAML document converts into. Defaults here are the
//! single source for every value an author may omit.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::statement::{HostMatch, Statement};
use crate::vocabulary::{
    ContentType, DefaultAction, OverrideAction, OverrideRuleAction, RuleAction, RuleGroupType,
    Scope,
};

/// Sort key for rule groups that declare no `order`.
pub const DEFAULT_ORDER: i64 = 999;

/// Root of a policy document. Read-only once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    pub metadata: Metadata,
    pub settings: Settings,
    #[serde(default)]
    pub allowed_hosts: Vec<HostMatch>,
    pub rule_groups: BTreeMap<String, RuleGroup>,
    #[serde(default)]
    pub security_policy: SecurityPolicy,
    #[serde(default)]
    pub custom_response_bodies: BTreeMap<String, CustomResponseBody>,
    /// Consumed by the test-runner generator; passed through untouched.
    #[serde(default)]
    pub test_definitions: Option<serde_yaml::Value>,
}

impl PolicyConfig {
    /// Convert a parsed document into the typed model.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_value(value)
    }

    pub fn project(&self) -> &str {
        &self.metadata.project
    }

    /// Rule groups of one kind, in key order.
    pub fn groups_of(&self, kind: RuleGroupType) -> impl Iterator<Item = (&str, &RuleGroup)> {
        self.rule_groups
            .iter()
            .filter(move |(_, group)| group.kind.group_type() == kind)
            .map(|(name, group)| (name.as_str(), group))
    }

    pub fn has_test_definitions(&self) -> bool {
        matches!(&self.test_definitions, Some(v) if !v.is_null())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub project: String,
    pub policy_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub account_id: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_policy_version", deserialize_with = "string_or_number")]
    pub policy_version: String,
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_policy_version() -> String {
    "v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_scope")]
    pub scope: Scope,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    #[serde(default = "default_true")]
    pub auto_remediation: bool,
    #[serde(default = "default_body_size_limit")]
    pub body_size_limit: u64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub fms_admin_account: String,
    #[serde(default = "default_count_resource_name")]
    pub fms_policy_count_resource_name: String,
    #[serde(default = "default_block_resource_name")]
    pub fms_policy_block_resource_name: String,
    #[serde(default)]
    pub default_action: Option<DefaultAction>,
}

fn default_scope() -> Scope {
    Scope::Regional
}

fn default_resource_type() -> String {
    "AWS::CloudFront::Distribution".to_string()
}

fn default_true() -> bool {
    true
}

fn default_body_size_limit() -> u64 {
    65536
}

fn default_count_resource_name() -> String {
    "count".to_string()
}

fn default_block_resource_name() -> String {
    "block".to_string()
}

/// A named rule group plus the per-variant knobs that apply when it is embedded
/// in the count and block policies.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleGroup {
    /// Display name; may contain `${project}`. Falls back to the map key.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default = "default_true")]
    pub include_in_count: bool,
    #[serde(default)]
    pub override_action_count: OverrideAction,
    #[serde(default)]
    pub override_action_block: OverrideAction,
    #[serde(default)]
    pub rule_action_overrides_count: Option<Vec<RuleActionOverride>>,
    #[serde(default)]
    pub rule_action_overrides_block: Option<Vec<RuleActionOverride>>,
    #[serde(flatten)]
    pub kind: RuleGroupKind,
}

impl RuleGroup {
    pub fn sort_order(&self) -> i64 {
        self.order.unwrap_or(DEFAULT_ORDER)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleGroupKind {
    /// CIDR allow/deny list; the rule group wrapping it is provisioned elsewhere.
    IpSet {
        ip_addresses: Vec<String>,
        #[serde(default)]
        arn_variable: Option<String>,
    },
    Managed {
        managed_rule_group: String,
        #[serde(default = "default_vendor")]
        vendor: String,
        #[serde(default)]
        version: Option<String>,
    },
    Custom {
        rules: Vec<Rule>,
        #[serde(default = "default_capacity")]
        capacity: u32,
        #[serde(default = "default_namespace")]
        namespace: String,
    },
    /// Rule group owned by another stack, referenced by ARN input variable(s).
    External {
        #[serde(default)]
        arn_variable: Option<String>,
        #[serde(default)]
        arn_variable_count: Option<String>,
        #[serde(default)]
        arn_variable_block: Option<String>,
    },
    Module {
        module_source: String,
        #[serde(default)]
        module_params: BTreeMap<String, serde_yaml::Value>,
        #[serde(default = "default_output_arn")]
        output_arn: String,
    },
}

impl RuleGroupKind {
    pub fn group_type(&self) -> RuleGroupType {
        match self {
            RuleGroupKind::IpSet { .. } => RuleGroupType::IpSet,
            RuleGroupKind::Managed { .. } => RuleGroupType::Managed,
            RuleGroupKind::Custom { .. } => RuleGroupType::Custom,
            RuleGroupKind::External { .. } => RuleGroupType::External,
            RuleGroupKind::Module { .. } => RuleGroupType::Module,
        }
    }
}

fn default_vendor() -> String {
    "AWS".to_string()
}

fn default_capacity() -> u32 {
    100
}

fn default_namespace() -> String {
    "custom".to_string()
}

fn default_output_arn() -> String {
    "arn".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleActionOverride {
    pub name: String,
    pub action: OverrideRuleAction,
}

/// One rule inside a custom rule group.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    pub action: RuleAction,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub custom_response: Option<CustomResponse>,
    pub statement: Statement,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomResponse {
    #[serde(default = "default_response_code")]
    pub response_code: u16,
    #[serde(default)]
    pub custom_response_body_key: Option<String>,
}

fn default_response_code() -> u16 {
    403
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityPolicy {
    #[serde(default)]
    pub first_rule_groups: Vec<String>,
    #[serde(default)]
    pub last_rule_groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomResponseBody {
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: ContentType,
}

fn default_content_type() -> ContentType {
    ContentType::TextPlain
}

/// Accept YAML strings and numbers (account ids are often written unquoted).
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Statement;
    use crate::vocabulary::PositionalConstraint;

    const MINIMAL: &str = r#"
version: "1.0"
metadata:
  project: donut_v8
  policy_name: donut-policy
  account_id: 123456789012
settings:
  scope: CLOUDFRONT
rule_groups:
  common:
    type: external
    order: 1
    arn_variable: common_arn
  bots:
    type: custom
    order: 2
    include_in_count: false
    override_action_block: COUNT
    rules:
      - name: BlockBadBots
        priority: 1
        action: block
        statement:
          or_methods: [GET]
"#;

    #[test]
    fn deserialize_minimal_config() {
        let config: PolicyConfig = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.metadata.account_id, "123456789012");
        assert_eq!(config.metadata.policy_version, "v1");
        assert_eq!(config.settings.scope, Scope::Cloudfront);
        assert_eq!(config.settings.body_size_limit, 65536);
        assert_eq!(config.settings.fms_policy_count_resource_name, "count");
        assert!(config.allowed_hosts.is_empty());
        assert!(!config.has_test_definitions());

        let common = &config.rule_groups["common"];
        assert!(common.include_in_count);
        assert_eq!(common.override_action_count, OverrideAction::None);
        assert!(matches!(
            &common.kind,
            RuleGroupKind::External { arn_variable: Some(v), .. } if v == "common_arn"
        ));

        let bots = &config.rule_groups["bots"];
        assert!(!bots.include_in_count);
        assert_eq!(bots.override_action_block, OverrideAction::Count);
        match &bots.kind {
            RuleGroupKind::Custom {
                rules,
                capacity,
                namespace,
            } => {
                assert_eq!(*capacity, 100);
                assert_eq!(namespace, "custom");
                assert_eq!(rules[0].action, RuleAction::Block);
                assert_eq!(
                    rules[0].statement,
                    Statement::OrMethods(vec!["GET".to_string()])
                );
            }
            other => panic!("expected custom group, got {:?}", other),
        }
    }

    #[test]
    fn groups_of_filters_by_kind() {
        let config: PolicyConfig = serde_yaml::from_str(MINIMAL).unwrap();
        let custom: Vec<_> = config.groups_of(RuleGroupType::Custom).map(|(k, _)| k).collect();
        assert_eq!(custom, vec!["bots"]);
    }

    #[test]
    fn allowed_hosts_default_match() {
        let hosts: Vec<HostMatch> =
            serde_yaml::from_str("[{host: a.example.com}, {host: b.example.com, match: STARTS_WITH}]")
                .unwrap();
        assert_eq!(hosts[0].match_type, PositionalConstraint::Exactly);
        assert_eq!(hosts[1].match_type, PositionalConstraint::StartsWith);
    }

    #[test]
    fn invalid_statement_fails_conversion() {
        let broken = MINIMAL.replace("or_methods: [GET]", "geo_match: {}");
        let err = serde_yaml::from_str::<PolicyConfig>(&broken).unwrap_err();
        assert!(err.to_string().contains("geo_match"));
    }
}
