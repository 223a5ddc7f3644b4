//! Template Expansion
//!
//! Two tokens exist and they live on separate paths:
//! - `${account_id}` in statement strings (label keys, search strings, rule labels)
//! - `${project}` in rule-group and policy resource names
//!
//! Nothing else is interpolated. Unknown `${...}` sequences pass through and are
//! escaped by the HCL writer.

pub const ACCOUNT_ID_TOKEN: &str = "${account_id}";
pub const PROJECT_TOKEN: &str = "${project}";

/// Substitutes `${account_id}`.
pub fn expand_account_id(template: &str, account_id: &str) -> String {
    template.replace(ACCOUNT_ID_TOKEN, account_id)
}

/// Substitutes `${project}`.
pub fn expand_project(template: &str, project: &str) -> String {
    template.replace(PROJECT_TOKEN, project)
}
