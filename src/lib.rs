//! waf-policy-gen: WAF policy YAML → AWS FMS Terraform
//!
//! Pipeline, leaves first:
//! - `vocabulary`: every enumerated term the policy language accepts
//! - `statement`: statement sum type, shared shape parser, HCL compiler
//! - `validator`: schema and business-rule gate over the raw document
//! - `terraform`: rule-group blocks plus the count and block FMS policies
//! - `artifacts`: in-memory file set with an atomic directory write
//! - `test_export`: hands `test_definitions` to the test-runner generator
//!
//! ```text
//! YAML ──► ConfigLoader::load_document ──► validator::validate
//!                                               │ ok
//!                                               ▼
//!                               ConfigLoader::into_typed ──► terraform::generate
//! ```

pub mod artifacts;
pub mod config;
pub mod error;
pub mod hcl;
pub mod statement;
pub mod template;
pub mod terraform;
pub mod test_export;
pub mod validator;
pub mod vocabulary;

// Re-export commonly used types
pub use artifacts::ArtifactSet;
pub use config::{ConfigLoader, PolicyConfig, Rule, RuleGroup, RuleGroupKind};
pub use error::{PolicyError, Result};
pub use statement::{compile_statement, Statement, StatementCompiler, StatementParser};
pub use terraform::{
    generate, plan_variant, PolicyPlan, PolicyVariant, ResourceNames, TerraformArtifacts,
    TerraformBuilder,
};
pub use test_export::export_test_definitions;
pub use validator::{validate, ValidationError, ValidationResult};
