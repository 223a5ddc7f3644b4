//! Statement language: AST, shape parser and HCL compiler.

pub mod ast;
pub mod compiler;
pub mod parser;

pub use ast::{
    ByteMatch, FieldToMatch, HostMatch, HostsRef, LabelMatch, RegexMatch, SizeConstraint,
    SqliMatch, Statement, TextTransformation, XssMatch, ALLOWED_HOSTS_TOKEN,
};
pub use compiler::{compile_statement, StatementCompiler};
pub use parser::{ParseOutcome, StatementIssue, StatementParser};
