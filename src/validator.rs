//! Policy Validator
//!
//! Schema and business-rule checks over the raw YAML document. Gate for
//! generation: nothing is compiled while `errors` is non-empty.
//!
//! # Behaviour
//!
//! - Missing top-level sections fail fast; the semantic checks assume they exist.
//! - Every other violation is collected, so one run reports every problem.
//! - Statements are checked by the same [`StatementParser`] the typed loader
//!   uses; the validator and compiler cannot disagree on the vocabulary.
//! - Once all business rules pass, the document must also convert into
//!   [`PolicyConfig`]. A passing config is therefore always compilable.
//!
//! # Usage
//!
//! ```
//! use waf_policy_gen::validator::validate;
//!
//! let doc = serde_yaml::from_str("version: '1.0'").unwrap();
//! let result = validate(&doc);
//! assert!(!result.valid);
//! assert_eq!(result.errors.len(), 3);
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PolicyConfig;
use crate::statement::{StatementIssue, StatementParser};
use crate::terraform::naming::{group_names, metric_name};
use crate::vocabulary::{
    ContentType, DefaultAction, OverrideAction, OverrideRuleAction, PositionalConstraint,
    RuleAction, RuleGroupType, Scope, UnknownTerm,
};

/// Sections without which no semantic check can run.
pub const REQUIRED_SECTIONS: [&str; 4] = ["version", "metadata", "settings", "rule_groups"];

const REQUIRED_METADATA: [&str; 3] = ["project", "policy_name", "account_id"];

/// Request-body inspection limits FMS accepts, in bytes.
const SUPPORTED_BODY_SIZE_LIMITS: [u64; 4] = [16384, 32768, 49152, 65536];

// =============================================================================
// ERROR TYPES
// =============================================================================

/// A business-rule violation. Individually non-fatal; any one blocks generation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Configuration root must be a mapping")]
    RootNotMapping,

    #[error("Missing required field: {0}")]
    MissingSection(&'static str),

    #[error("Missing required metadata field: {0}")]
    MissingMetadataField(&'static str),

    #[error("{path}: expected {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
    },

    #[error("{location}: {term}")]
    InvalidTerm { location: String, term: UnknownTerm },

    #[error("allowed_hosts entry {index} missing 'host' field")]
    MissingHost { index: usize },

    #[error("Duplicate order {order} in rule_groups: '{first}' and '{second}'")]
    DuplicateOrder {
        order: i64,
        first: String,
        second: String,
    },

    #[error("Rule groups '{first}' and '{second}' both derive the resource name '{identifier}'")]
    DuplicateResourceName {
        identifier: String,
        first: String,
        second: String,
    },

    #[error("Invalid rule type '{kind}' in {group}")]
    InvalidGroupType { group: String, kind: String },

    #[error("Rule group '{group}': {kind} type requires {field}")]
    MissingGroupField {
        group: String,
        kind: RuleGroupType,
        field: &'static str,
    },

    #[error("Rule group '{group}': Invalid CIDR '{cidr}'")]
    InvalidCidr { group: String, cidr: String },

    #[error("Rule group '{group}': custom type must have rules")]
    EmptyRules { group: String },

    #[error("Rule '{rule}' in '{group}' missing {field}")]
    RuleMissingField {
        group: String,
        rule: String,
        field: &'static str,
    },

    #[error("Rule group '{group}': duplicate rule priority {priority} ('{first}' and '{second}')")]
    DuplicatePriority {
        group: String,
        priority: i64,
        first: String,
        second: String,
    },

    #[error("Rule group '{group}': duplicate rule name '{rule}'")]
    DuplicateRuleName { group: String, rule: String },

    #[error("Rule group '{group}': rules '{first}' and '{second}' share the metric name '{metric}'")]
    DuplicateMetricName {
        group: String,
        metric: String,
        first: String,
        second: String,
    },

    #[error("Rule '{rule}': {issue}")]
    Statement {
        group: String,
        rule: String,
        issue: StatementIssue,
    },

    #[error("Rule '{rule}': response_code {code} is not an HTTP status between 200 and 599")]
    InvalidResponseCode { rule: String, code: i64 },

    #[error("Rule '{rule}': custom response body '{key}' is not defined in custom_response_bodies")]
    UndefinedResponseBody { rule: String, key: String },

    #[error("custom_response_bodies '{key}' missing content")]
    MissingResponseContent { key: String },

    #[error("Security policy references undefined rule group '{0}'")]
    UndefinedGroupReference(String),

    #[error("Test suite {index} missing name")]
    TestSuiteMissingName { index: usize },

    #[error("Test in suite '{suite}' missing id")]
    TestMissingId { suite: String },

    #[error("Test '{test}' missing request")]
    TestMissingRequest { test: String },

    #[error("Configuration does not match schema: {0}")]
    Schema(String),
}

// =============================================================================
// VALIDATION RESULT
// =============================================================================

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Validate a parsed policy document.
pub fn validate(document: &Value) -> ValidationResult {
    PolicyValidator::new(document).validate()
}

struct PolicyValidator<'a> {
    document: &'a Value,
    errors: Vec<ValidationError>,
    warnings: Vec<String>,
}

impl<'a> PolicyValidator<'a> {
    fn new(document: &'a Value) -> Self {
        Self {
            document,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn validate(mut self) -> ValidationResult {
        let document = self.document;
        let Some(root) = document.as_mapping() else {
            self.errors.push(ValidationError::RootNotMapping);
            return self.finish();
        };

        for section in REQUIRED_SECTIONS {
            if !root.contains_key(section) {
                self.errors.push(ValidationError::MissingSection(section));
            }
        }
        if !self.errors.is_empty() {
            return self.finish();
        }

        self.validate_metadata(root.get("metadata"));
        self.validate_settings(root.get("settings"));
        let hosts_defined = self.validate_allowed_hosts(root.get("allowed_hosts"));
        let bodies = self.validate_response_bodies(root.get("custom_response_bodies"));
        let project = root
            .get("metadata")
            .and_then(|m| m.get("project"))
            .and_then(scalar_text)
            .unwrap_or_default();
        self.validate_rule_groups(root.get("rule_groups"), &project, hosts_defined, &bodies);
        self.validate_security_policy(root.get("security_policy"), root.get("rule_groups"));
        self.validate_test_definitions(root.get("test_definitions"));

        if self.errors.is_empty() {
            if let Err(e) = PolicyConfig::from_value(document.clone()) {
                self.errors.push(ValidationError::Schema(e.to_string()));
            }
        }

        self.finish()
    }

    fn finish(self) -> ValidationResult {
        info!(
            "Validation finished: {} errors, {} warnings",
            self.errors.len(),
            self.warnings.len()
        );
        ValidationResult {
            valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    fn validate_metadata(&mut self, metadata: Option<&Value>) {
        let Some(metadata) = self.mapping(metadata, "metadata") else {
            return;
        };

        for field in REQUIRED_METADATA {
            if !metadata.contains_key(field) {
                self.errors.push(ValidationError::MissingMetadataField(field));
            }
        }

        if let Some(account_id) = metadata.get("account_id").and_then(scalar_text) {
            if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
                self.warnings
                    .push(format!("Account ID '{}' should be 12 digits", account_id));
            }
        }
    }

    fn validate_settings(&mut self, settings: Option<&Value>) {
        let Some(settings) = self.mapping(settings, "settings") else {
            return;
        };

        self.term::<Scope>(settings, "scope", "settings");
        if let Some(DefaultAction::Count) =
            self.term::<DefaultAction>(settings, "default_action", "settings")
        {
            self.warnings.push(
                "settings.default_action 'count' is not a web ACL default action; ALLOW will be used"
                    .to_string(),
            );
        }

        if let Some(v) = settings.get("auto_remediation") {
            if !v.is_bool() {
                self.wrong_type("settings.auto_remediation", "a boolean");
            }
        }

        if let Some(v) = settings.get("body_size_limit") {
            match v.as_u64() {
                Some(limit) if !SUPPORTED_BODY_SIZE_LIMITS.contains(&limit) => {
                    self.warnings.push(format!(
                        "settings.body_size_limit {} is not an FMS inspection limit (16384, 32768, 49152, 65536)",
                        limit
                    ));
                }
                Some(_) => {}
                None => self.wrong_type("settings.body_size_limit", "a positive integer"),
            }
        }
    }

    /// Returns whether any hosts are defined.
    fn validate_allowed_hosts(&mut self, hosts: Option<&Value>) -> bool {
        let Some(hosts) = hosts.filter(|v| !v.is_null()) else {
            return false;
        };
        let Some(hosts) = hosts.as_sequence() else {
            self.wrong_type("allowed_hosts", "a list");
            return false;
        };

        for (index, host) in hosts.iter().enumerate() {
            let location = format!("allowed_hosts[{}]", index);
            let Some(entry) = self.mapping(Some(host), &location) else {
                continue;
            };
            if entry.get("host").and_then(scalar_text).is_none() {
                self.errors.push(ValidationError::MissingHost { index });
            }
            self.term::<PositionalConstraint>(entry, "match", &location);
        }

        !hosts.is_empty()
    }

    /// Returns the declared body keys.
    fn validate_response_bodies(&mut self, bodies: Option<&Value>) -> Vec<String> {
        let Some(bodies) = bodies.filter(|v| !v.is_null()) else {
            return Vec::new();
        };
        let Some(bodies) = self.mapping(Some(bodies), "custom_response_bodies") else {
            return Vec::new();
        };

        let mut keys = Vec::with_capacity(bodies.len());
        for (key, body) in bodies {
            let key = key_text(key);
            let location = format!("custom_response_bodies.{}", key);
            if let Some(body) = self.mapping(Some(body), &location) {
                if body.get("content").and_then(scalar_text).is_none() {
                    self.errors
                        .push(ValidationError::MissingResponseContent { key: key.clone() });
                }
                self.term::<ContentType>(body, "content_type", &location);
            }
            keys.push(key);
        }
        keys
    }

    fn validate_rule_groups(
        &mut self,
        groups: Option<&Value>,
        project: &str,
        hosts_defined: bool,
        bodies: &[String],
    ) {
        let Some(groups) = self.mapping(groups, "rule_groups") else {
            return;
        };
        if groups.is_empty() {
            self.warnings.push("No rule groups defined".to_string());
        }

        let mut orders: HashMap<i64, String> = HashMap::new();
        // derived Terraform identifier -> group key
        let mut identifiers: HashMap<String, String> = HashMap::new();

        for (name, group) in groups {
            let name = key_text(name);
            let location = format!("rule_groups.{}", name);
            let Some(group) = self.mapping(Some(group), &location) else {
                continue;
            };
            debug!("Validating rule group '{}'", name);

            let display = group.get("name").and_then(scalar_text);
            let resource = group_names(&name, display.as_deref(), project).resource;
            if let Some(first) = identifiers.get(&resource) {
                self.errors.push(ValidationError::DuplicateResourceName {
                    identifier: resource,
                    first: first.clone(),
                    second: name.clone(),
                });
            } else {
                identifiers.insert(resource, name.clone());
            }

            if let Some(order) = group.get("order") {
                match order.as_i64() {
                    Some(order) => {
                        if let Some(first) = orders.get(&order) {
                            self.errors.push(ValidationError::DuplicateOrder {
                                order,
                                first: first.clone(),
                                second: name.clone(),
                            });
                        } else {
                            orders.insert(order, name.clone());
                        }
                    }
                    None => self.wrong_type(&format!("{}.order", location), "an integer"),
                }
            }

            if let Some(v) = group.get("include_in_count") {
                if !v.is_bool() {
                    self.wrong_type(&format!("{}.include_in_count", location), "a boolean");
                }
            }
            self.term::<OverrideAction>(group, "override_action_count", &location);
            self.term::<OverrideAction>(group, "override_action_block", &location);
            self.validate_rule_action_overrides(group, "rule_action_overrides_count", &location);
            self.validate_rule_action_overrides(group, "rule_action_overrides_block", &location);

            let kind_text = group.get("type").and_then(Value::as_str).unwrap_or("");
            let Ok(kind) = RuleGroupType::from_str(kind_text) else {
                self.errors.push(ValidationError::InvalidGroupType {
                    group: name.clone(),
                    kind: kind_text.to_string(),
                });
                continue;
            };

            match kind {
                RuleGroupType::IpSet => self.validate_ip_set_group(&name, group),
                RuleGroupType::Managed => {
                    self.require_group_field(&name, group, kind, "managed_rule_group")
                }
                RuleGroupType::External => self.validate_external_group(&name, group),
                RuleGroupType::Module => self.require_group_field(&name, group, kind, "module_source"),
                RuleGroupType::Custom => {
                    self.validate_custom_group(&name, group, hosts_defined, bodies)
                }
            }
        }
    }

    fn require_group_field(
        &mut self,
        name: &str,
        group: &Mapping,
        kind: RuleGroupType,
        field: &'static str,
    ) {
        if group.get(field).and_then(scalar_text).is_none() {
            self.errors.push(ValidationError::MissingGroupField {
                group: name.to_string(),
                kind,
                field,
            });
        }
    }

    fn validate_ip_set_group(&mut self, name: &str, group: &Mapping) {
        let Some(addresses) = group.get("ip_addresses") else {
            self.errors.push(ValidationError::MissingGroupField {
                group: name.to_string(),
                kind: RuleGroupType::IpSet,
                field: "ip_addresses",
            });
            return;
        };
        let Some(addresses) = addresses.as_sequence() else {
            self.wrong_type(&format!("rule_groups.{}.ip_addresses", name), "a list");
            return;
        };

        for address in addresses {
            let text = scalar_text(address).unwrap_or_default();
            if !is_valid_cidr(&text) {
                self.errors.push(ValidationError::InvalidCidr {
                    group: name.to_string(),
                    cidr: text,
                });
            }
        }
    }

    fn validate_external_group(&mut self, name: &str, group: &Mapping) {
        let single = group.contains_key("arn_variable");
        let count = group.contains_key("arn_variable_count");
        let block = group.contains_key("arn_variable_block");

        if !single && !count && !block {
            self.errors.push(ValidationError::MissingGroupField {
                group: name.to_string(),
                kind: RuleGroupType::External,
                field: "arn_variable or arn_variable_count/arn_variable_block",
            });
            return;
        }

        let in_count = group
            .get("include_in_count")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if in_count && !single && !count {
            self.warnings.push(format!(
                "Rule group '{}': no ARN variable for the count policy; it will be omitted there",
                name
            ));
        }
        if !single && !block {
            self.warnings.push(format!(
                "Rule group '{}': no ARN variable for the block policy; it will be omitted there",
                name
            ));
        }
    }

    fn validate_rule_action_overrides(&mut self, group: &Mapping, key: &str, location: &str) {
        let Some(overrides) = group.get(key) else {
            return;
        };
        let location = format!("{}.{}", location, key);
        let Some(overrides) = overrides.as_sequence() else {
            self.wrong_type(&location, "a list");
            return;
        };
        for (i, entry) in overrides.iter().enumerate() {
            let entry_location = format!("{}[{}]", location, i);
            let Some(entry) = self.mapping(Some(entry), &entry_location) else {
                continue;
            };
            if entry.get("name").and_then(scalar_text).is_none() {
                self.wrong_type(&format!("{}.name", entry_location), "a rule name");
            }
            if entry.contains_key("action") {
                self.term::<OverrideRuleAction>(entry, "action", &entry_location);
            } else {
                self.wrong_type(&format!("{}.action", entry_location), "a rule action");
            }
        }
    }

    fn validate_custom_group(
        &mut self,
        name: &str,
        group: &Mapping,
        hosts_defined: bool,
        bodies: &[String],
    ) {
        let rules = group.get("rules").and_then(Value::as_sequence);
        let Some(rules) = rules.filter(|r| !r.is_empty()) else {
            self.errors.push(ValidationError::EmptyRules {
                group: name.to_string(),
            });
            return;
        };

        if let Some(v) = group.get("capacity") {
            if v.as_u64().map_or(true, |c| c == 0) {
                self.wrong_type(&format!("rule_groups.{}.capacity", name), "a positive integer");
            }
        }

        let mut priorities: HashMap<i64, String> = HashMap::new();
        let mut names: Vec<String> = Vec::with_capacity(rules.len());

        for rule in rules {
            self.validate_rule(name, rule, hosts_defined, bodies, &mut priorities, &mut names);
        }

        let mut metrics: HashMap<String, &str> = HashMap::new();
        for rule in &names {
            let metric = metric_name(rule);
            if let Some(first) = metrics.get(&metric) {
                self.errors.push(ValidationError::DuplicateMetricName {
                    group: name.to_string(),
                    metric,
                    first: first.to_string(),
                    second: rule.clone(),
                });
            } else {
                metrics.insert(metric, rule);
            }
        }
    }

    fn validate_rule(
        &mut self,
        group: &str,
        rule: &Value,
        hosts_defined: bool,
        bodies: &[String],
        priorities: &mut HashMap<i64, String>,
        names: &mut Vec<String>,
    ) {
        let Some(rule) = self.mapping(Some(rule), &format!("rule_groups.{}.rules[]", group)) else {
            return;
        };
        let rule_name = rule
            .get("name")
            .and_then(scalar_text)
            .unwrap_or_else(|| "unknown".to_string());

        for field in ["name", "action", "statement"] {
            if !rule.contains_key(field) {
                self.errors.push(ValidationError::RuleMissingField {
                    group: group.to_string(),
                    rule: rule_name.clone(),
                    field,
                });
            }
        }

        if rule.contains_key("name") {
            if names.contains(&rule_name) {
                self.errors.push(ValidationError::DuplicateRuleName {
                    group: group.to_string(),
                    rule: rule_name.clone(),
                });
            } else {
                names.push(rule_name.clone());
            }
        }

        let location = format!("Rule '{}'", rule_name);
        let action = self.term::<RuleAction>(rule, "action", &location);

        let priority = match rule.get("priority") {
            None => Some(0),
            Some(v) => {
                let p = v.as_i64();
                if p.is_none() {
                    self.wrong_type(&format!("{}.priority", location), "an integer");
                }
                p
            }
        };
        if let Some(priority) = priority {
            if let Some(first) = priorities.get(&priority) {
                self.errors.push(ValidationError::DuplicatePriority {
                    group: group.to_string(),
                    priority,
                    first: first.clone(),
                    second: rule_name.clone(),
                });
            } else {
                priorities.insert(priority, rule_name.clone());
            }
        }

        if let Some(label) = rule.get("label") {
            if scalar_text(label).is_none() && !label.is_null() {
                self.wrong_type(&format!("{}.label", location), "a string");
            }
        }

        if let Some(response) = rule.get("custom_response") {
            self.validate_custom_response(&rule_name, response, action, bodies);
        }

        if let Some(statement) = rule.get("statement") {
            let outcome = StatementParser::with_allowed_hosts(hosts_defined).parse(statement);
            for issue in outcome.errors {
                self.errors.push(ValidationError::Statement {
                    group: group.to_string(),
                    rule: rule_name.clone(),
                    issue,
                });
            }
            for issue in outcome.warnings {
                self.warnings.push(format!("Rule '{}': {}", rule_name, issue));
            }
        }
    }

    fn validate_custom_response(
        &mut self,
        rule: &str,
        response: &Value,
        action: Option<RuleAction>,
        bodies: &[String],
    ) {
        let location = format!("Rule '{}'.custom_response", rule);
        let Some(response) = self.mapping(Some(response), &location) else {
            return;
        };

        if action != Some(RuleAction::Block) {
            self.warnings.push(format!(
                "Rule '{}': custom_response is only applied to block actions",
                rule
            ));
        }

        if let Some(code) = response.get("response_code") {
            match code.as_i64() {
                Some(code) if (200..=599).contains(&code) => {}
                Some(code) => self.errors.push(ValidationError::InvalidResponseCode {
                    rule: rule.to_string(),
                    code,
                }),
                None => self.wrong_type(&format!("{}.response_code", location), "an integer"),
            }
        }

        if let Some(key) = response.get("custom_response_body_key").and_then(scalar_text) {
            if !bodies.contains(&key) {
                self.errors.push(ValidationError::UndefinedResponseBody {
                    rule: rule.to_string(),
                    key,
                });
            }
        }
    }

    fn validate_security_policy(&mut self, policy: Option<&Value>, groups: Option<&Value>) {
        let Some(policy) = policy.filter(|v| !v.is_null()) else {
            return;
        };
        let Some(policy) = self.mapping(Some(policy), "security_policy") else {
            return;
        };
        let groups = groups.and_then(Value::as_mapping);

        for key in ["first_rule_groups", "last_rule_groups"] {
            let Some(refs) = policy.get(key) else {
                continue;
            };
            let Some(refs) = refs.as_sequence() else {
                self.wrong_type(&format!("security_policy.{}", key), "a list");
                continue;
            };
            for group_ref in refs {
                let group_ref = scalar_text(group_ref).unwrap_or_default();
                let exists = groups.is_some_and(|g| g.contains_key(group_ref.as_str()));
                if !exists {
                    self.errors
                        .push(ValidationError::UndefinedGroupReference(group_ref));
                }
            }
        }
    }

    /// Minimal shape check; deep validation belongs to the test generator.
    fn validate_test_definitions(&mut self, definitions: Option<&Value>) {
        let Some(definitions) = definitions.filter(|v| !v.is_null()) else {
            return;
        };
        let Some(suites) = definitions
            .get("test_suites")
            .and_then(Value::as_sequence)
        else {
            return;
        };

        for (index, suite) in suites.iter().enumerate() {
            let suite_name = suite.get("name").and_then(scalar_text);
            if suite_name.is_none() {
                self.errors.push(ValidationError::TestSuiteMissingName { index });
            }
            let suite_name = suite_name.unwrap_or_else(|| "None".to_string());

            let tests = suite.get("tests").and_then(Value::as_sequence);
            for test in tests.into_iter().flatten() {
                let id = test.get("id").and_then(scalar_text);
                if id.is_none() {
                    self.errors.push(ValidationError::TestMissingId {
                        suite: suite_name.clone(),
                    });
                }
                if test.get("request").is_none() {
                    self.errors.push(ValidationError::TestMissingRequest {
                        test: id.unwrap_or_else(|| "None".to_string()),
                    });
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // helpers
    // -------------------------------------------------------------------------

    fn mapping<'v>(&mut self, value: Option<&'v Value>, path: &str) -> Option<&'v Mapping> {
        match value {
            Some(Value::Mapping(map)) => Some(map),
            _ => {
                self.wrong_type(path, "a mapping");
                None
            }
        }
    }

    fn wrong_type(&mut self, path: &str, expected: &'static str) {
        self.errors.push(ValidationError::WrongType {
            path: path.to_string(),
            expected,
        });
    }

    /// Check an optional vocabulary term. Returns the parsed term when valid.
    fn term<T>(&mut self, map: &Mapping, key: &str, location: &str) -> Option<T>
    where
        T: FromStr<Err = UnknownTerm>,
    {
        match map.get(key)? {
            Value::Null => None,
            Value::String(raw) => match raw.parse() {
                Ok(term) => Some(term),
                Err(term) => {
                    self.errors.push(ValidationError::InvalidTerm {
                        location: location.to_string(),
                        term,
                    });
                    None
                }
            },
            _ => {
                self.errors.push(ValidationError::WrongType {
                    path: format!("{}.{}", location, key),
                    expected: "a string",
                });
                None
            }
        }
    }
}

/// Scalar rendered as text (account ids and names are often unquoted numbers).
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn key_text(key: &Value) -> String {
    scalar_text(key).unwrap_or_else(|| format!("{:?}", key))
}

/// CIDR block or bare address, IPv4 or IPv6.
pub fn is_valid_cidr(text: &str) -> bool {
    text.parse::<ipnet::IpNet>().is_ok() || text.parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(yaml: &str) -> ValidationResult {
        validate(&serde_yaml::from_str(yaml).unwrap())
    }

    const BASE: &str = r#"
version: "1.0"
metadata:
  project: donut
  policy_name: donut-policy
  account_id: "123456789012"
settings:
  scope: CLOUDFRONT
"#;

    fn with_groups(groups: &str) -> String {
        format!("{}rule_groups:\n{}", BASE, groups)
    }

    #[test]
    fn test_fails_fast_on_missing_sections() {
        let result = run("version: '1.0'\nmetadata: {}\n");
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                ValidationError::MissingSection("settings"),
                ValidationError::MissingSection("rule_groups"),
            ]
        );
        // metadata is empty but semantic checks never ran
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_non_mapping_root() {
        let result = run("- just\n- a list\n");
        assert_eq!(result.errors, vec![ValidationError::RootNotMapping]);
    }

    #[test]
    fn test_minimal_valid_config() {
        let result = run(&with_groups(
            "  common:\n    type: external\n    order: 1\n    arn_variable: common_arn\n",
        ));
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_duplicate_order_names_both_groups() {
        let result = run(&with_groups(
            r#"
  alpha: {type: external, order: 5, arn_variable: a}
  beta: {type: external, order: 5, arn_variable: b}
"#,
        ));
        assert_eq!(
            result.errors,
            vec![ValidationError::DuplicateOrder {
                order: 5,
                first: "alpha".into(),
                second: "beta".into(),
            }]
        );
        let message = result.errors[0].to_string();
        assert!(message.contains("alpha") && message.contains("beta") && message.contains('5'));
    }

    #[test]
    fn test_invalid_cidr() {
        let result = run(&with_groups(
            "  office:\n    type: ip_set\n    ip_addresses: [10.0.0.0/8, 10.0.0.0/33, 2001:db8::/32, 192.168.1.1]\n",
        ));
        assert_eq!(
            result.errors,
            vec![ValidationError::InvalidCidr {
                group: "office".into(),
                cidr: "10.0.0.0/33".into(),
            }]
        );
    }

    #[test]
    fn test_group_type_requirements() {
        let result = run(&with_groups(
            r#"
  a: {type: managed}
  b: {type: external}
  c: {type: module}
  d: {type: custom, rules: []}
  e: {type: firewall}
"#,
        ));
        let messages = result.error_messages();
        assert_eq!(messages.len(), 5, "{:?}", messages);
        assert!(messages[0].contains("managed type requires managed_rule_group"));
        assert!(messages[1].contains("external type requires arn_variable"));
        assert!(messages[2].contains("module type requires module_source"));
        assert!(messages[3].contains("custom type must have rules"));
        assert!(messages[4].contains("Invalid rule type 'firewall' in e"));
    }

    #[test]
    fn test_settings_and_hosts_terms() {
        let yaml = r#"
version: "1.0"
metadata: {project: p, policy_name: n, account_id: "12345"}
settings: {scope: GLOBAL, default_action: deny}
allowed_hosts:
  - match: EXACTLY
  - host: ok.example.com
    match: FUZZY
rule_groups: {}
"#;
        let result = run(yaml);
        let messages = result.error_messages();
        assert_eq!(messages.len(), 4, "{:?}", messages);
        assert!(messages[0].contains("unknown scope 'GLOBAL'"));
        assert!(messages[1].contains("unknown default_action 'deny'"));
        assert!(messages[2].contains("allowed_hosts entry 0 missing 'host'"));
        assert!(messages[3].contains("FUZZY"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Account ID '12345' should be 12 digits")));
    }

    #[test]
    fn test_rule_level_checks() {
        let result = run(&with_groups(
            r#"
  bots:
    type: custom
    rules:
      - name: a
        priority: 1
        action: deny
        statement: {or_methods: [GET]}
      - name: a
        priority: 1
        action: block
      - action: count
        priority: 2
        statement:
          size_constraint: {size: "1kb", comparison_operator: BIGGER}
"#,
        ));
        let messages = result.error_messages();
        assert!(messages.iter().any(|m| m.contains("Invalid action") || m.contains("unknown action 'deny'")));
        assert!(messages.iter().any(|m| m.contains("duplicate rule name 'a'")));
        assert!(messages.iter().any(|m| m.contains("duplicate rule priority 1")));
        assert!(messages.iter().any(|m| m == "Rule 'a' in 'bots' missing statement"));
        assert!(messages.iter().any(|m| m == "Rule 'unknown' in 'bots' missing name"));
        assert!(messages.iter().any(|m| m.contains("size must be an integer")));
        assert!(messages.iter().any(|m| m.contains("BIGGER")));
    }

    #[test]
    fn test_rules_sharing_a_metric_name() {
        let result = run(&with_groups(
            r#"
  bots:
    type: custom
    rules:
      - {name: Block-Bots, priority: 1, action: block, statement: {xss_match: {}}}
      - {name: BlockBots, priority: 2, action: block, statement: {xss_match: {}}}
      - {name: Allow-Health, priority: 3, action: allow, statement: {xss_match: {}}}
"#,
        ));
        assert_eq!(
            result.errors,
            vec![ValidationError::DuplicateMetricName {
                group: "bots".into(),
                metric: "BlockBots".into(),
                first: "Block-Bots".into(),
                second: "BlockBots".into(),
            }]
        );
    }

    #[test]
    fn test_group_identifiers_use_the_expanded_display_name() {
        let result = run(&with_groups(
            r#"
  donut_edge: {type: external, arn_variable: a}
  edge: {type: external, name: "${project}-edge", arn_variable: b}
"#,
        ));
        assert_eq!(
            result.errors,
            vec![ValidationError::DuplicateResourceName {
                identifier: "donut_edge".into(),
                first: "donut_edge".into(),
                second: "edge".into(),
            }]
        );
    }

    #[test]
    fn test_or_hosts_without_allowed_hosts_warns() {
        let result = run(&with_groups(
            r#"
  hosts:
    type: custom
    rules:
      - name: only-known-hosts
        action: block
        statement:
          not: {or_hosts: "${allowed_hosts}"}
"#,
        ));
        assert!(result.valid, "{:?}", result.errors);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("references allowed_hosts but none defined")));
    }

    #[test]
    fn test_custom_response_references() {
        let yaml = format!(
            "{}{}",
            with_groups(
                r#"
  bots:
    type: custom
    rules:
      - name: r1
        priority: 1
        action: block
        custom_response: {response_code: 429, custom_response_body_key: too_many}
        statement: {or_methods: [POST]}
      - name: r2
        priority: 2
        action: block
        custom_response: {response_code: 99, custom_response_body_key: missing}
        statement: {or_methods: [PUT]}
"#
            ),
            "custom_response_bodies:\n  too_many: {content: slow down, content_type: TEXT_PLAIN}\n"
        );
        let result = run(&yaml);
        assert_eq!(
            result.errors,
            vec![
                ValidationError::InvalidResponseCode {
                    rule: "r2".into(),
                    code: 99
                },
                ValidationError::UndefinedResponseBody {
                    rule: "r2".into(),
                    key: "missing".into()
                },
            ]
        );
    }

    #[test]
    fn test_security_policy_references() {
        let yaml = format!(
            "{}security_policy:\n  first_rule_groups: [common]\n  last_rule_groups: [ghost]\n",
            with_groups("  common: {type: external, arn_variable: x}\n")
        );
        let result = run(&yaml);
        assert_eq!(
            result.errors,
            vec![ValidationError::UndefinedGroupReference("ghost".into())]
        );
    }

    #[test]
    fn test_external_variant_coverage_warnings() {
        let result = run(&with_groups(
            "  split: {type: external, arn_variable_count: only_count}\n",
        ));
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("block policy"));
    }

    #[test]
    fn test_test_definitions_shape() {
        let yaml = format!(
            "{}test_definitions:\n  test_suites:\n    - tests:\n        - request: {{method: GET}}\n    - name: smoke\n      tests:\n        - id: t1\n",
            with_groups("  common: {type: external, arn_variable: x}\n")
        );
        let result = run(&yaml);
        assert_eq!(
            result.error_messages(),
            vec![
                "Test suite 0 missing name".to_string(),
                "Test in suite 'None' missing id".to_string(),
                "Test 't1' missing request".to_string(),
            ]
        );
    }

    #[test]
    fn test_type_errors_are_reported_not_panicked() {
        let result = run(&with_groups(
            "  common: {type: external, order: first, include_in_count: maybe, arn_variable: x}\n",
        ));
        let messages = result.error_messages();
        assert_eq!(messages.len(), 2, "{:?}", messages);
        assert!(messages[0].contains("rule_groups.common.order: expected an integer"));
        assert!(messages[1].contains("include_in_count: expected a boolean"));
    }

    #[test]
    fn test_cidr_helper() {
        assert!(is_valid_cidr("10.0.0.0/8"));
        assert!(is_valid_cidr("203.0.113.7"));
        assert!(is_valid_cidr("2001:db8::/48"));
        assert!(!is_valid_cidr("10.0.0.0/33"));
        assert!(!is_valid_cidr("not-an-ip"));
        assert!(!is_valid_cidr(""));
    }
}
