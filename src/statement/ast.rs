//! Statement AST
//!
//! A rule's match logic is a closed sum type. Nodes are parsed once from YAML
//! (see [`super::parser`]) and never looked up by key again downstream.

use serde::{Deserialize, Deserializer, Serialize};

use crate::vocabulary::{
    ComparisonOperator, Field, LabelScope, OversizeHandling, PositionalConstraint,
    SensitivityLevel, TextTransformationType,
};

/// Token that makes `or_hosts` resolve against the global `allowed_hosts` list.
pub const ALLOWED_HOSTS_TOKEN: &str = "${allowed_hosts}";

/// A logical predicate over an HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    And(Vec<Statement>),
    Or(Vec<Statement>),
    Not(Box<Statement>),
    /// Shorthand: OR of exact, case-insensitive HTTP method matches.
    OrMethods(Vec<String>),
    /// Shorthand: OR of `Host` header matches.
    OrHosts(HostsRef),
    ByteMatch(ByteMatch),
    SqliMatch(SqliMatch),
    XssMatch(XssMatch),
    SizeConstraint(SizeConstraint),
    RegexMatch(RegexMatch),
    LabelMatch(LabelMatch),
}

impl Statement {
    /// Number of leaf/shorthand nodes in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Statement::And(children) | Statement::Or(children) => {
                children.iter().map(Statement::leaf_count).sum()
            }
            Statement::Not(child) => child.leaf_count(),
            _ => 1,
        }
    }
}

impl<'de> Deserialize<'de> for Statement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        Statement::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Target of an `or_hosts` shorthand.
#[derive(Debug, Clone, PartialEq)]
pub enum HostsRef {
    /// The `${allowed_hosts}` token.
    AllowedHosts,
    Inline(Vec<HostMatch>),
}

/// One host entry, as used by `allowed_hosts` and inline `or_hosts` lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMatch {
    pub host: String,
    #[serde(rename = "match", default = "default_host_match")]
    pub match_type: PositionalConstraint,
}

fn default_host_match() -> PositionalConstraint {
    PositionalConstraint::Exactly
}

/// Which part of the request a leaf inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldToMatch {
    pub field: Field,
    /// Only meaningful for `SINGLE_HEADER`.
    pub header_name: Option<String>,
    /// Only meaningful for `BODY`; compiler default is CONTINUE.
    pub oversize_handling: Option<OversizeHandling>,
}

impl FieldToMatch {
    pub fn new(field: Field) -> Self {
        Self {
            field,
            header_name: None,
            oversize_handling: None,
        }
    }

    pub fn single_header(name: impl Into<String>) -> Self {
        Self {
            field: Field::SingleHeader,
            header_name: Some(name.into()),
            oversize_handling: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextTransformation {
    pub priority: i64,
    pub kind: TextTransformationType,
}

impl TextTransformation {
    pub fn new(priority: i64, kind: TextTransformationType) -> Self {
        Self { priority, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ByteMatch {
    pub field: FieldToMatch,
    pub search_string: String,
    pub positional_constraint: PositionalConstraint,
    /// Empty means "author supplied none"; the compiler emits a single NONE.
    pub text_transformations: Vec<TextTransformation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqliMatch {
    pub field: FieldToMatch,
    pub sensitivity_level: SensitivityLevel,
    pub text_transformations: Vec<TextTransformation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XssMatch {
    pub field: FieldToMatch,
    pub text_transformations: Vec<TextTransformation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeConstraint {
    pub field: FieldToMatch,
    pub comparison_operator: ComparisonOperator,
    pub size: i64,
    pub text_transformations: Vec<TextTransformation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegexMatch {
    pub field: FieldToMatch,
    pub regex_string: String,
    pub text_transformations: Vec<TextTransformation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatch {
    pub scope: LabelScope,
    /// May contain `${account_id}`; expanded at compile time.
    pub key: String,
}
