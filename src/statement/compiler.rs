//! Statement compiler
//!
//! Recursive descent from a [`Statement`] tree to `aws_wafv2_rule_group`
//! statement HCL. Pure: the same (statement, config) always yields the same
//! bytes, which matters because generated files are committed and diffed.
//!
//! ```text
//! and/or   ──► <op>_statement { statement { <child> } ... }
//! not      ──► not_statement  { statement { <child> } }
//! or_methods/or_hosts ──► expanded to `or` of byte matches, then compiled
//! leaf     ──► <leaf>_statement { ..., field_to_match, text_transformation+ }
//! ```

use tracing::warn;

use super::ast::*;
use crate::config::PolicyConfig;
use crate::hcl::{quote, HclWriter};
use crate::template::expand_account_id;
use crate::vocabulary::{Field, OversizeHandling, PositionalConstraint, TextTransformationType};

/// Compile `statement` with its first line indented by `indent` spaces.
pub fn compile_statement(statement: &Statement, config: &PolicyConfig, indent: usize) -> String {
    StatementCompiler::new(config).compile(statement, indent)
}

pub struct StatementCompiler<'a> {
    config: &'a PolicyConfig,
}

impl<'a> StatementCompiler<'a> {
    pub fn new(config: &'a PolicyConfig) -> Self {
        Self { config }
    }

    pub fn compile(&self, statement: &Statement, indent: usize) -> String {
        let mut w = HclWriter::with_indent(indent);
        self.emit(&mut w, statement);
        w.finish()
    }

    /// Write `statement` into an existing writer at its current indentation.
    pub fn emit(&self, w: &mut HclWriter, statement: &Statement) {
        match statement {
            Statement::And(children) => self.emit_combinator(w, "and_statement", children),
            Statement::Or(children) => self.emit_combinator(w, "or_statement", children),
            Statement::Not(child) => {
                w.open("not_statement");
                self.emit_wrapped(w, child);
                w.close();
            }
            Statement::OrMethods(_) | Statement::OrHosts(_) => {
                if let Some(expanded) = self.expand_shorthand(statement) {
                    self.emit(w, &expanded);
                }
            }
            Statement::ByteMatch(bm) => {
                w.open("byte_match_statement");
                w.attrs(&[
                    ("search_string", self.text(&bm.search_string)),
                    (
                        "positional_constraint",
                        quote(bm.positional_constraint.as_str()),
                    ),
                ]);
                self.emit_field(w, &bm.field);
                self.emit_transformations(w, &bm.text_transformations);
                w.close();
            }
            Statement::SqliMatch(sqli) => {
                w.open("sqli_match_statement");
                w.attr("sensitivity_level", quote(sqli.sensitivity_level.as_str()));
                self.emit_field(w, &sqli.field);
                self.emit_transformations(w, &sqli.text_transformations);
                w.close();
            }
            Statement::XssMatch(xss) => {
                w.open("xss_match_statement");
                self.emit_field(w, &xss.field);
                self.emit_transformations(w, &xss.text_transformations);
                w.close();
            }
            Statement::SizeConstraint(sc) => {
                w.open("size_constraint_statement");
                w.attrs(&[
                    ("comparison_operator", quote(sc.comparison_operator.as_str())),
                    ("size", sc.size.to_string()),
                ]);
                self.emit_field(w, &sc.field);
                self.emit_transformations(w, &sc.text_transformations);
                w.close();
            }
            Statement::RegexMatch(rm) => {
                w.open("regex_match_statement");
                w.attr("regex_string", quote(&rm.regex_string));
                self.emit_field(w, &rm.field);
                self.emit_transformations(w, &rm.text_transformations);
                w.close();
            }
            Statement::LabelMatch(lm) => {
                w.open("label_match_statement");
                w.attrs(&[("scope", quote(lm.scope.as_str())), ("key", self.text(&lm.key))]);
                w.close();
            }
        }
    }

    /// Macro-expand `or_methods` / `or_hosts` into an `or` of byte matches.
    /// Returns `None` for every other node.
    pub fn expand_shorthand(&self, statement: &Statement) -> Option<Statement> {
        match statement {
            Statement::OrMethods(verbs) => Some(Statement::Or(
                verbs
                    .iter()
                    .map(|verb| {
                        lowercase_byte_match(
                            FieldToMatch::new(Field::Method),
                            verb.to_lowercase(),
                            PositionalConstraint::Exactly,
                        )
                    })
                    .collect(),
            )),
            Statement::OrHosts(hosts_ref) => {
                let hosts = match hosts_ref {
                    HostsRef::AllowedHosts => self.config.allowed_hosts.as_slice(),
                    HostsRef::Inline(hosts) => hosts.as_slice(),
                };
                Some(Statement::Or(
                    hosts
                        .iter()
                        .map(|h| {
                            lowercase_byte_match(
                                FieldToMatch::single_header("host"),
                                h.host.clone(),
                                h.match_type,
                            )
                        })
                        .collect(),
                ))
            }
            _ => None,
        }
    }

    fn emit_combinator(&self, w: &mut HclWriter, block: &str, children: &[Statement]) {
        w.open(block);
        for child in children {
            self.emit_wrapped(w, child);
        }
        w.close();
    }

    fn emit_wrapped(&self, w: &mut HclWriter, child: &Statement) {
        w.open("statement");
        self.emit(w, child);
        w.close();
    }

    fn emit_field(&self, w: &mut HclWriter, field: &FieldToMatch) {
        w.open("field_to_match");
        match field.field {
            Field::Body => {
                let oversize = field
                    .oversize_handling
                    .unwrap_or(OversizeHandling::Continue);
                w.open("body");
                w.attr("oversize_handling", quote(oversize.as_str()));
                w.close();
            }
            Field::QueryString => w.empty_block("query_string"),
            Field::UriPath => w.empty_block("uri_path"),
            Field::Method => w.empty_block("method"),
            Field::SingleHeader => {
                let name = field.header_name.as_deref().unwrap_or_default();
                w.open("single_header");
                w.attr("name", quote(&name.to_lowercase()));
                w.close();
            }
            Field::AllQueryArguments => w.empty_block("all_query_arguments"),
            unlowered => {
                warn!(
                    "field {} has no field_to_match lowering; inspecting BODY instead",
                    unlowered
                );
                w.empty_block("body");
            }
        }
        w.close();
    }

    fn emit_transformations(&self, w: &mut HclWriter, transformations: &[TextTransformation]) {
        if transformations.is_empty() {
            emit_transformation(w, &TextTransformation::new(0, TextTransformationType::None));
            return;
        }
        for t in transformations {
            emit_transformation(w, t);
        }
    }

    /// Quoted string with `${account_id}` expanded.
    fn text(&self, raw: &str) -> String {
        quote(&expand_account_id(raw, &self.config.metadata.account_id))
    }
}

fn emit_transformation(w: &mut HclWriter, t: &TextTransformation) {
    w.open("text_transformation");
    w.attrs(&[
        ("priority", t.priority.to_string()),
        ("type", quote(t.kind.as_str())),
    ]);
    w.close();
}

fn lowercase_byte_match(
    field: FieldToMatch,
    search_string: String,
    positional_constraint: PositionalConstraint,
) -> Statement {
    Statement::ByteMatch(ByteMatch {
        field,
        search_string,
        positional_constraint,
        text_transformations: vec![TextTransformation::new(
            0,
            TextTransformationType::Lowercase,
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use pretty_assertions::assert_eq;

    fn config_with_hosts() -> PolicyConfig {
        serde_yaml::from_str(
            r#"
version: "1.0"
metadata: {project: donut, policy_name: donut-policy, account_id: "123456789012"}
settings: {scope: REGIONAL}
allowed_hosts:
  - host: a.example.com
  - host: b.example.com
    match: STARTS_WITH
rule_groups: {}
"#,
        )
        .unwrap()
    }

    fn statement(yaml: &str) -> Statement {
        Statement::from_value(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_or_methods_expansion() {
        let config = config_with_hosts();
        let compiler = StatementCompiler::new(&config);
        let expanded = compiler
            .expand_shorthand(&statement("or_methods: [GET, POST]"))
            .unwrap();

        let Statement::Or(members) = expanded else {
            panic!("expected or");
        };
        assert_eq!(members.len(), 2);
        for (member, verb) in members.iter().zip(["get", "post"]) {
            let Statement::ByteMatch(bm) = member else {
                panic!("expected byte match");
            };
            assert_eq!(bm.field.field, Field::Method);
            assert_eq!(bm.search_string, verb);
            assert_eq!(bm.positional_constraint, PositionalConstraint::Exactly);
            assert_eq!(
                bm.text_transformations,
                vec![TextTransformation::new(0, TextTransformationType::Lowercase)]
            );
        }
    }

    #[test]
    fn test_or_hosts_resolves_allowed_hosts() {
        let config = config_with_hosts();
        let compiler = StatementCompiler::new(&config);
        let expanded = compiler
            .expand_shorthand(&statement(r#"or_hosts: "${allowed_hosts}""#))
            .unwrap();

        let Statement::Or(members) = expanded else {
            panic!("expected or");
        };
        let constraints: Vec<_> = members
            .iter()
            .map(|m| match m {
                Statement::ByteMatch(bm) => {
                    assert_eq!(bm.field.header_name.as_deref(), Some("host"));
                    bm.positional_constraint
                }
                other => panic!("expected byte match, got {:?}", other),
            })
            .collect();
        assert_eq!(
            constraints,
            vec![PositionalConstraint::Exactly, PositionalConstraint::StartsWith]
        );
    }

    #[test]
    fn test_compile_or_methods_text() {
        let config = config_with_hosts();
        let hcl = compile_statement(&statement("or_methods: [GET]"), &config, 0);
        assert_eq!(
            hcl,
            r#"or_statement {
  statement {
    byte_match_statement {
      search_string         = "get"
      positional_constraint = "EXACTLY"
      field_to_match {
        method {}
      }
      text_transformation {
        priority = 0
        type     = "LOWERCASE"
      }
    }
  }
}
"#
        );
    }

    #[test]
    fn test_compile_not_with_default_transformation() {
        let config = config_with_hosts();
        let hcl = compile_statement(
            &statement("not: {xss_match: {field: BODY, oversize_handling: MATCH}}"),
            &config,
            6,
        );
        assert_eq!(
            hcl,
            r#"      not_statement {
        statement {
          xss_match_statement {
            field_to_match {
              body {
                oversize_handling = "MATCH"
              }
            }
            text_transformation {
              priority = 0
              type     = "NONE"
            }
          }
        }
      }
"#
        );
    }

    #[test]
    fn test_and_preserves_child_order() {
        let config = config_with_hosts();
        let hcl = compile_statement(
            &statement(
                r#"
and:
  - size_constraint: {field: QUERY_STRING, comparison_operator: GT, size: 2048}
  - sqli_match: {field: ALL_QUERY_ARGUMENTS, sensitivity_level: HIGH}
"#,
            ),
            &config,
            0,
        );
        let size_at = hcl.find("size_constraint_statement").unwrap();
        let sqli_at = hcl.find("sqli_match_statement").unwrap();
        assert!(size_at < sqli_at);
        assert!(hcl.starts_with("and_statement {\n  statement {\n    size_constraint_statement {"));
        assert!(hcl.contains("size                = 2048"));
        assert!(hcl.contains("sensitivity_level = \"HIGH\""));
        assert!(hcl.contains("all_query_arguments {}"));
    }

    #[test]
    fn test_single_header_lowercased_and_unlowered_fallback() {
        let config = config_with_hosts();
        let header = compile_statement(
            &statement("byte_match: {field: SINGLE_HEADER, header_name: User-Agent, search_string: curl}"),
            &config,
            0,
        );
        assert!(header.contains("single_header {\n      name = \"user-agent\"\n    }"));

        let cookies = compile_statement(&statement("xss_match: {field: COOKIES}"), &config, 0);
        assert!(cookies.contains("field_to_match {\n    body {}\n  }"));
        assert!(!cookies.contains("oversize_handling"));
    }

    #[test]
    fn test_label_key_expands_account_id() {
        let config = config_with_hosts();
        let hcl = compile_statement(
            &statement(r#"label_match: {scope: NAMESPACE, key: "awswaf:${account_id}:bots:"}"#),
            &config,
            0,
        );
        assert!(hcl.contains(r#"key   = "awswaf:123456789012:bots:""#));
        assert!(hcl.contains(r#"scope = "NAMESPACE""#));
    }

    #[test]
    fn test_regex_is_escaped_verbatim() {
        let config = config_with_hosts();
        let hcl = compile_statement(
            &statement(r#"regex_match: {field: URI_PATH, regex_string: '^/api/v\d+/'}"#),
            &config,
            0,
        );
        assert!(hcl.contains(r#"regex_string = "^/api/v\\d+/""#));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let config = config_with_hosts();
        let stmt = statement(
            r#"
or:
  - or_hosts: "${allowed_hosts}"
  - and: [{or_methods: [PUT, DELETE]}, {not: {label_match: {key: "x:${account_id}"}}}]
"#,
        );
        assert_eq!(
            compile_statement(&stmt, &config, 4),
            compile_statement(&stmt, &config, 4)
        );
    }
}
