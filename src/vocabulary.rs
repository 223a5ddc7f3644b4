//! Shared Vocabulary
//!
//! Every enumerated term the configuration language recognises lives here, once.
//! The validator, the typed config model and the statement compiler all parse
//! through these types, so a term accepted in one place is accepted everywhere.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A term that is not part of a vocabulary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {vocabulary} '{value}' (expected one of: {expected})")]
pub struct UnknownTerm {
    pub vocabulary: &'static str,
    pub value: String,
    pub expected: String,
}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All terms, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Human-readable name of this vocabulary (used in diagnostics).
            pub const LABEL: &'static str = $label;

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Comma-separated list of accepted terms.
            pub fn expected() -> String {
                [$($text),+].join(", ")
            }
        }

        impl FromStr for $name {
            type Err = UnknownTerm;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownTerm {
                        vocabulary: $label,
                        value: other.to_string(),
                        expected: Self::expected(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

vocabulary! {
    /// Where the web ACL is deployed.
    Scope ("scope") {
        Cloudfront => "CLOUDFRONT",
        Regional => "REGIONAL",
    }
}

vocabulary! {
    /// Web ACL default action.
    DefaultAction ("default_action") {
        Allow => "allow",
        Block => "block",
        Count => "count",
    }
}

vocabulary! {
    /// Action of a rule inside a custom rule group.
    RuleAction ("action") {
        Allow => "allow",
        Block => "block",
        Count => "count",
        None => "none",
    }
}

vocabulary! {
    /// Discriminator of a rule group definition.
    RuleGroupType ("rule type") {
        IpSet => "ip_set",
        Managed => "managed",
        Custom => "custom",
        External => "external",
        Module => "module",
    }
}

vocabulary! {
    /// Request component a leaf statement inspects.
    Field ("field") {
        Body => "BODY",
        JsonBody => "JSON_BODY",
        Headers => "HEADERS",
        Cookies => "COOKIES",
        UriPath => "URI_PATH",
        QueryString => "QUERY_STRING",
        SingleHeader => "SINGLE_HEADER",
        SingleQueryArgument => "SINGLE_QUERY_ARGUMENT",
        AllQueryArguments => "ALL_QUERY_ARGUMENTS",
        Method => "METHOD",
    }
}

impl Field {
    /// Whether the compiler has a dedicated `field_to_match` lowering for this field.
    ///
    /// Fields outside this set still validate but compile to a bare `body {}` match.
    pub fn is_lowered(self) -> bool {
        matches!(
            self,
            Field::Body
                | Field::QueryString
                | Field::UriPath
                | Field::Method
                | Field::SingleHeader
                | Field::AllQueryArguments
        )
    }
}

vocabulary! {
    /// Byte-match positional constraint.
    PositionalConstraint ("positional_constraint") {
        Exactly => "EXACTLY",
        StartsWith => "STARTS_WITH",
        EndsWith => "ENDS_WITH",
        Contains => "CONTAINS",
        ContainsWord => "CONTAINS_WORD",
    }
}

vocabulary! {
    /// Size-constraint comparison operator.
    ComparisonOperator ("comparison_operator") {
        Eq => "EQ",
        Ne => "NE",
        Le => "LE",
        Lt => "LT",
        Ge => "GE",
        Gt => "GT",
    }
}

vocabulary! {
    TextTransformationType ("text transformation") {
        None => "NONE",
        CompressWhiteSpace => "COMPRESS_WHITE_SPACE",
        HtmlEntityDecode => "HTML_ENTITY_DECODE",
        Lowercase => "LOWERCASE",
        CmdLine => "CMD_LINE",
        UrlDecode => "URL_DECODE",
        Base64Decode => "BASE64_DECODE",
        HexDecode => "HEX_DECODE",
        NormalizePath => "NORMALIZE_PATH",
        NormalizePathWin => "NORMALIZE_PATH_WIN",
        RemoveNulls => "REMOVE_NULLS",
        UrlDecodeUni => "URL_DECODE_UNI",
    }
}

vocabulary! {
    LabelScope ("label scope") {
        Label => "LABEL",
        Namespace => "NAMESPACE",
    }
}

vocabulary! {
    /// SQLi detection sensitivity. LOW avoids false positives on multipart boundaries.
    SensitivityLevel ("sensitivity_level") {
        Low => "LOW",
        High => "HIGH",
    }
}

vocabulary! {
    /// What to do with request bodies larger than the inspection limit.
    OversizeHandling ("oversize_handling") {
        Continue => "CONTINUE",
        Match => "MATCH",
        NoMatch => "NO_MATCH",
    }
}

vocabulary! {
    /// Override applied to a whole rule group when embedded in a policy variant.
    OverrideAction ("override action") {
        None => "NONE",
        Count => "COUNT",
    }
}

impl Default for OverrideAction {
    fn default() -> Self {
        OverrideAction::None
    }
}

vocabulary! {
    /// Replacement action for a single rule inside an embedded rule group.
    OverrideRuleAction ("rule action override") {
        Allow => "allow",
        Block => "block",
        Count => "count",
        Captcha => "captcha",
        Challenge => "challenge",
    }
}

vocabulary! {
    ContentType ("content_type") {
        TextPlain => "TEXT_PLAIN",
        TextHtml => "TEXT_HTML",
        ApplicationJson => "APPLICATION_JSON",
    }
}

vocabulary! {
    /// The key that selects a statement node's shape.
    StatementKind ("statement type") {
        And => "and",
        Or => "or",
        Not => "not",
        OrMethods => "or_methods",
        OrHosts => "or_hosts",
        ByteMatch => "byte_match",
        SqliMatch => "sqli_match",
        XssMatch => "xss_match",
        SizeConstraint => "size_constraint",
        RegexMatch => "regex_match",
        LabelMatch => "label_match",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip_names() {
        assert_eq!("STARTS_WITH".parse::<PositionalConstraint>().unwrap(), PositionalConstraint::StartsWith);
        assert_eq!(Scope::Cloudfront.to_string(), "CLOUDFRONT");
        assert_eq!(RuleGroupType::IpSet.as_str(), "ip_set");
    }

    #[test]
    fn test_unknown_term_lists_expected() {
        let err = "SOMEWHERE".parse::<Scope>().unwrap_err();
        assert_eq!(err.vocabulary, "scope");
        assert!(err.to_string().contains("CLOUDFRONT, REGIONAL"));
    }

    #[test]
    fn test_terms_are_case_sensitive() {
        assert!("body".parse::<Field>().is_err());
        assert!("BLOCK".parse::<RuleAction>().is_err());
    }

    #[test]
    fn test_lowered_fields_are_a_strict_subset() {
        let lowered: Vec<_> = Field::ALL.iter().filter(|f| f.is_lowered()).collect();
        assert_eq!(lowered.len(), 6);
        assert!(!Field::JsonBody.is_lowered());
        assert!(!Field::Cookies.is_lowered());
        assert!(Field::SingleHeader.is_lowered());
    }

    #[test]
    fn test_deserialize_through_serde() {
        let action: OverrideAction = serde_yaml::from_str("COUNT").unwrap();
        assert_eq!(action, OverrideAction::Count);
        let err = serde_yaml::from_str::<OverrideAction>("BLOCK").unwrap_err();
        assert!(err.to_string().contains("override action"));
    }
}
