//! Validator tests over the YAML fixtures.
//!
//! Run with: cargo test --test validator_integration

use std::path::{Path, PathBuf};

use waf_policy_gen::config::ConfigLoader;
use waf_policy_gen::{validate, ValidationError};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str) -> serde_yaml::Value {
    ConfigLoader::new(fixture(name)).load_document().unwrap()
}

#[test]
fn test_full_fixture_is_valid_without_warnings() {
    let result = validate(&load("donut_v8.yaml"));
    assert!(result.is_valid(), "{:?}", result.errors);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[test]
fn test_duplicate_order_and_cidr_are_both_reported() {
    let result = validate(&load("duplicate_order.yaml"));
    assert!(!result.is_valid());
    assert_eq!(
        result.errors,
        vec![
            ValidationError::DuplicateOrder {
                order: 5,
                first: "first_group".into(),
                second: "second_group".into(),
            },
            ValidationError::InvalidCidr {
                group: "office".into(),
                cidr: "10.0.0.0/33".into(),
            },
        ]
    );

    let messages = result.error_messages();
    assert!(messages[0].contains("first_group"));
    assert!(messages[0].contains("second_group"));
    assert!(messages[0].contains('5'));
    assert!(messages[1].contains("CIDR"));
}

#[test]
fn test_groups_deriving_the_same_identifier_are_rejected() {
    let document: serde_yaml::Value = serde_yaml::from_str(
        r#"
version: "1.0"
metadata: {project: donut, policy_name: donut-waf, account_id: "123456789012"}
settings: {scope: REGIONAL}
rule_groups:
  a-b:
    type: custom
    order: 1
    rules:
      - {name: r1, priority: 1, action: block, statement: {xss_match: {field: BODY}}}
  a_b:
    type: custom
    order: 2
    rules:
      - {name: r1, priority: 1, action: block, statement: {xss_match: {field: BODY}}}
  office:
    type: external
    order: 3
    name: My Group
    arn_variable: office_arn
  partners:
    type: external
    order: 4
    name: My_Group
    arn_variable: partners_arn
"#,
    )
    .unwrap();

    let result = validate(&document);
    assert!(!result.is_valid());
    assert_eq!(
        result.errors,
        vec![
            ValidationError::DuplicateResourceName {
                identifier: "a_b".into(),
                first: "a-b".into(),
                second: "a_b".into(),
            },
            ValidationError::DuplicateResourceName {
                identifier: "My_Group".into(),
                first: "office".into(),
                second: "partners".into(),
            },
        ]
    );
    let messages = result.error_messages();
    assert!(messages[0].contains("'a-b'") && messages[0].contains("'a_b'"));
}

#[test]
fn test_statement_errors_carry_their_location() {
    let yaml = std::fs::read_to_string(fixture("donut_v8.yaml"))
        .unwrap()
        .replace("comparison_operator: GT", "comparison_operator: HUGE")
        .replace("or_methods: [GET, POST]", "or_methods: GET");
    let document: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

    let result = validate(&document);
    let messages = result.error_messages();
    assert_eq!(messages.len(), 2, "{:?}", messages);
    assert!(messages[0].starts_with("Rule 'allow-safe-methods': or_methods must be a list"));
    assert!(messages[1].starts_with("Rule 'block-large-body': Invalid comparison_operator 'HUGE'"));
    assert!(messages[1].contains("statement.size_constraint"));
}

#[test]
fn test_unlowered_field_is_a_warning() {
    let yaml = std::fs::read_to_string(fixture("donut_v8.yaml"))
        .unwrap()
        .replace("field: URI_PATH", "field: COOKIES");
    let document: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

    let result = validate(&document);
    assert!(result.is_valid(), "{:?}", result.errors);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("'COOKIES' has no dedicated lowering"));
}

#[test]
fn test_missing_file_is_a_load_error() {
    let err = ConfigLoader::new(fixture("nope.yaml")).load_document().unwrap_err();
    assert!(err.is_config_load());
}
