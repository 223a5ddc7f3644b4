//! Statement shape parser
//!
//! Turns a YAML statement node into a [`Statement`], collecting every problem
//! instead of stopping at the first one. The validator reports these issues
//! verbatim; the typed config loader uses the same parser and fails on the
//! first error. One grammar, two consumers.
//!
//! # Shapes
//!
//! ```yaml
//! and: [<statement>, ...]
//! or:  [<statement>, ...]
//! not: <statement>
//! or_methods: [GET, POST]
//! or_hosts: "${allowed_hosts}"          # or a list of {host, match}
//! byte_match:      {field, search_string, positional_constraint, text_transformations}
//! sqli_match:      {field, sensitivity_level, text_transformations}
//! xss_match:       {field, text_transformations}
//! size_constraint: {field, comparison_operator, size, text_transformations}
//! regex_match:     {field, regex_string, text_transformations}
//! label_match:     {scope, key}
//! ```
//!
//! Every node has exactly one shape key.

use std::str::FromStr;

use regex::Regex;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use super::ast::*;
use crate::vocabulary::{
    ComparisonOperator, Field, LabelScope, OversizeHandling, PositionalConstraint,
    SensitivityLevel, StatementKind, TextTransformationType, UnknownTerm,
};

/// A problem found in a statement tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (at {path})")]
pub struct StatementIssue {
    /// Dotted location inside the rule, e.g. `statement.and[1].byte_match`.
    pub path: String,
    pub message: String,
}

/// Result of parsing one statement tree.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Present only when no errors were found.
    pub statement: Option<Statement>,
    pub errors: Vec<StatementIssue>,
    pub warnings: Vec<StatementIssue>,
}

/// Collecting statement parser.
#[derive(Debug, Default)]
pub struct StatementParser {
    /// `Some(false)` makes `or_hosts: ${allowed_hosts}` warn. `None` = unknown context.
    allowed_hosts_defined: Option<bool>,
    errors: Vec<StatementIssue>,
    warnings: Vec<StatementIssue>,
}

impl StatementParser {
    /// Parser with no config context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser that knows whether the config defines any `allowed_hosts`.
    pub fn with_allowed_hosts(defined: bool) -> Self {
        Self {
            allowed_hosts_defined: Some(defined),
            ..Self::default()
        }
    }

    pub fn parse(mut self, value: &Value) -> ParseOutcome {
        let statement = self.node(value, "statement");
        ParseOutcome {
            statement: if self.errors.is_empty() {
                Some(statement)
            } else {
                None
            },
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(StatementIssue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(StatementIssue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    /// Parse one node. On error a placeholder is returned and the error recorded;
    /// callers only look at the tree when `errors` is empty.
    fn node(&mut self, value: &Value, path: &str) -> Statement {
        let Some(map) = value.as_mapping() else {
            self.error(path, "statement must be a mapping");
            return Statement::And(Vec::new());
        };

        let mut kinds = Vec::new();
        for key in map.keys() {
            match key.as_str().map(StatementKind::from_str) {
                Some(Ok(kind)) => kinds.push(kind),
                Some(Err(_)) | None => self.error(
                    path,
                    format!("unrecognised statement key {}", describe_key(key)),
                ),
            }
        }

        let kind = match kinds.as_slice() {
            [kind] => *kind,
            [] => {
                self.error(
                    path,
                    format!(
                        "statement has no recognised type (expected one of: {})",
                        StatementKind::expected()
                    ),
                );
                return Statement::And(Vec::new());
            }
            many => {
                let names: Vec<_> = many.iter().map(|k| k.as_str()).collect();
                self.error(
                    path,
                    format!("statement has multiple types: {}", names.join(", ")),
                );
                return Statement::And(Vec::new());
            }
        };

        let body = map.get(kind.as_str()).unwrap_or(&Value::Null);
        let path = format!("{}.{}", path, kind.as_str());

        match kind {
            StatementKind::And => Statement::And(self.children(body, &path)),
            StatementKind::Or => Statement::Or(self.children(body, &path)),
            StatementKind::Not => Statement::Not(Box::new(self.node(body, &path))),
            StatementKind::OrMethods => Statement::OrMethods(self.methods(body, &path)),
            StatementKind::OrHosts => Statement::OrHosts(self.hosts(body, &path)),
            StatementKind::ByteMatch => {
                let map = self.leaf_map(body, &path);
                Statement::ByteMatch(ByteMatch {
                    field: self.field_to_match(&map, &path),
                    search_string: self.required_string(&map, "search_string", &path),
                    positional_constraint: self.term(
                        &map,
                        "positional_constraint",
                        &path,
                        PositionalConstraint::Contains,
                    ),
                    text_transformations: self.transformations(&map, &path),
                })
            }
            StatementKind::SqliMatch => {
                let map = self.leaf_map(body, &path);
                Statement::SqliMatch(SqliMatch {
                    field: self.field_to_match(&map, &path),
                    sensitivity_level: self.term(
                        &map,
                        "sensitivity_level",
                        &path,
                        SensitivityLevel::Low,
                    ),
                    text_transformations: self.transformations(&map, &path),
                })
            }
            StatementKind::XssMatch => {
                let map = self.leaf_map(body, &path);
                Statement::XssMatch(XssMatch {
                    field: self.field_to_match(&map, &path),
                    text_transformations: self.transformations(&map, &path),
                })
            }
            StatementKind::SizeConstraint => {
                let map = self.leaf_map(body, &path);
                Statement::SizeConstraint(SizeConstraint {
                    field: self.field_to_match(&map, &path),
                    comparison_operator: self.term(
                        &map,
                        "comparison_operator",
                        &path,
                        ComparisonOperator::Gt,
                    ),
                    size: self.size(&map, &path),
                    text_transformations: self.transformations(&map, &path),
                })
            }
            StatementKind::RegexMatch => {
                let map = self.leaf_map(body, &path);
                let regex_string = self.required_string(&map, "regex_string", &path);
                if !regex_string.is_empty() {
                    if let Err(e) = Regex::new(&regex_string) {
                        self.error(&path, format!("Invalid regex '{}': {}", regex_string, e));
                    }
                }
                Statement::RegexMatch(RegexMatch {
                    field: self.field_to_match(&map, &path),
                    regex_string,
                    text_transformations: self.transformations(&map, &path),
                })
            }
            StatementKind::LabelMatch => {
                let map = self.leaf_map(body, &path);
                Statement::LabelMatch(LabelMatch {
                    scope: self.term(&map, "scope", &path, LabelScope::Label),
                    key: self.string(&map, "key", &path).unwrap_or_default(),
                })
            }
        }
    }

    fn children(&mut self, body: &Value, path: &str) -> Vec<Statement> {
        match body.as_sequence() {
            Some(items) if !items.is_empty() => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.node(item, &format!("{}[{}]", path, i)))
                .collect(),
            Some(_) => {
                self.error(path, "must contain at least one statement");
                Vec::new()
            }
            None => {
                self.error(path, "must be a list of statements");
                Vec::new()
            }
        }
    }

    fn methods(&mut self, body: &Value, path: &str) -> Vec<String> {
        let Some(items) = body.as_sequence() else {
            self.error(path, "or_methods must be a list");
            return Vec::new();
        };
        if items.is_empty() {
            self.error(path, "or_methods must not be empty");
        }
        let mut verbs = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(verb) if !verb.trim().is_empty() => verbs.push(verb.to_string()),
                _ => self.error(
                    &format!("{}[{}]", path, i),
                    "HTTP method must be a non-empty string",
                ),
            }
        }
        verbs
    }

    fn hosts(&mut self, body: &Value, path: &str) -> HostsRef {
        match body {
            Value::String(token) if token == ALLOWED_HOSTS_TOKEN => {
                if self.allowed_hosts_defined == Some(false) {
                    self.warn(path, "references allowed_hosts but none defined");
                }
                HostsRef::AllowedHosts
            }
            Value::Sequence(items) => {
                if items.is_empty() {
                    self.error(path, "or_hosts must list at least one host");
                }
                let mut hosts = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let entry_path = format!("{}[{}]", path, i);
                    let map = self.leaf_map(item, &entry_path);
                    match self.string(&map, "host", &entry_path) {
                        Some(host) if !host.is_empty() => hosts.push(HostMatch {
                            host,
                            match_type: self.term(
                                &map,
                                "match",
                                &entry_path,
                                PositionalConstraint::Exactly,
                            ),
                        }),
                        _ => self.error(&entry_path, "host entry missing 'host' field"),
                    }
                }
                HostsRef::Inline(hosts)
            }
            _ => {
                self.error(
                    path,
                    format!(
                        "or_hosts must be '{}' or a list of hosts",
                        ALLOWED_HOSTS_TOKEN
                    ),
                );
                HostsRef::Inline(Vec::new())
            }
        }
    }

    fn leaf_map(&mut self, body: &Value, path: &str) -> Mapping {
        match body {
            Value::Mapping(map) => map.clone(),
            _ => {
                self.error(path, "must be a mapping");
                Mapping::new()
            }
        }
    }

    fn field_to_match(&mut self, map: &Mapping, path: &str) -> FieldToMatch {
        let field = self.term(map, "field", path, Field::Body);
        let header_name = self.string(map, "header_name", path);
        let oversize_handling = map
            .contains_key("oversize_handling")
            .then(|| self.term(map, "oversize_handling", path, OversizeHandling::Continue));

        if field == Field::SingleHeader && header_name.as_deref().map_or(true, str::is_empty) {
            self.error(path, "SINGLE_HEADER requires header_name");
        }
        if !field.is_lowered() {
            self.warn(
                path,
                format!(
                    "field '{}' has no dedicated lowering and will be inspected as BODY",
                    field
                ),
            );
        }

        FieldToMatch {
            field,
            header_name,
            oversize_handling,
        }
    }

    fn transformations(&mut self, map: &Mapping, path: &str) -> Vec<TextTransformation> {
        let Some(raw) = map.get("text_transformations") else {
            return Vec::new();
        };
        let path = format!("{}.text_transformations", path);
        let Some(items) = raw.as_sequence() else {
            self.error(&path, "must be a list");
            return Vec::new();
        };

        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", path, i);
            let entry = self.leaf_map(item, &item_path);
            let priority = match entry.get("priority") {
                None => 0,
                Some(v) => v.as_i64().unwrap_or_else(|| {
                    self.error(&item_path, "priority must be an integer");
                    0
                }),
            };
            let kind = self.term(&entry, "type", &item_path, TextTransformationType::None);
            out.push(TextTransformation::new(priority, kind));
        }
        out
    }

    fn size(&mut self, map: &Mapping, path: &str) -> i64 {
        match map.get("size") {
            None => 0,
            Some(v) => match v.as_i64() {
                Some(size) if size >= 0 => size,
                Some(_) => {
                    self.error(path, "size must not be negative");
                    0
                }
                None => {
                    self.error(path, "size must be an integer");
                    0
                }
            },
        }
    }

    /// Scalar as text. Numbers and booleans are accepted and rendered verbatim.
    fn string(&mut self, map: &Mapping, key: &str, path: &str) -> Option<String> {
        match map.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => None,
            _ => {
                self.error(path, format!("{} must be a string", key));
                None
            }
        }
    }

    /// Like [`Self::string`], but absence and `""` are errors.
    fn required_string(&mut self, map: &Mapping, key: &str, path: &str) -> String {
        match self.string(map, key, path) {
            Some(s) if !s.is_empty() => s,
            Some(_) => {
                self.error(path, format!("{} must not be empty", key));
                String::new()
            }
            // wrong type, already reported by `string`
            None if map.get(key).is_some_and(|v| !v.is_null()) => String::new(),
            None => {
                self.error(path, format!("missing required {}", key));
                String::new()
            }
        }
    }

    fn term<T>(&mut self, map: &Mapping, key: &str, path: &str, default: T) -> T
    where
        T: FromStr<Err = UnknownTerm>,
    {
        match map.get(key) {
            None | Some(Value::Null) => default,
            Some(Value::String(raw)) => raw.parse().unwrap_or_else(|e: UnknownTerm| {
                self.error(
                    path,
                    format!("Invalid {} '{}' (expected one of: {})", key, e.value, e.expected),
                );
                default
            }),
            Some(_) => {
                self.error(path, format!("{} must be a string", key));
                default
            }
        }
    }
}

fn describe_key(key: &Value) -> String {
    match key.as_str() {
        Some(s) => format!("'{}'", s),
        None => format!("{:?}", key),
    }
}

impl Statement {
    /// Strict, context-free parse. Fails on the first error.
    pub fn from_value(value: &Value) -> Result<Statement, StatementIssue> {
        let outcome = StatementParser::new().parse(value);
        match outcome.statement {
            Some(statement) => Ok(statement),
            None => Err(outcome
                .errors
                .into_iter()
                .next()
                .unwrap_or_else(|| StatementIssue {
                    path: "statement".to_string(),
                    message: "invalid statement".to_string(),
                })),
        }
    }
}
