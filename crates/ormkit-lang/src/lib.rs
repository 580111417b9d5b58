//! ormkit filter language
//!
//! This crate parses textual filters into [`Expression`] trees, evaluates them
//! against raw records and rewrites them into disjunctive normal form.
//!
//! # Syntax
//!
//! ```text
//! model = ? and make = ?
//! (price >= ? or make in ?) and name starts with ?
//! tags contains ? or room = ?
//! kind not in ?
//! ```
//!
//! Values are never written inline: each `?` consumes the next positional
//! argument. `and` binds tighter than `or`; parentheses group.
//!
//! # Usage
//!
//! ```rust
//! use ormkit_lang::parse_filter;
//! use ormkit_proto::{AttributeType, ObjectType, Record};
//!
//! let phone = ObjectType::new("Phone")
//!     .with_attribute("make", AttributeType::Text)
//!     .with_attribute("model", AttributeType::Text);
//!
//! let expr = parse_filter("model = ? and make = ?", &phone, &["5230".into(), "Samsung".into()])
//!     .unwrap();
//!
//! let record = Record::new("Phone", "1")
//!     .with_attribute("make", "Samsung")
//!     .with_attribute("model", "5230");
//! assert!(expr.evaluate(&record));
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod span;

pub use ast::FilterCondition;
pub use compiler::compile_map;
pub use error::{CompileError, CompileErrorKind, LangError, NormalizeError, ParseError};
pub use eval::{compare, loose_eq, values_match};
pub use expr::{Expression, Field, Operation, Operator};
pub use normalize::DEFAULT_MAX_CLAUSES;
pub use span::{Span, Spanned};

use ormkit_proto::{ObjectType, Value};

/// Parse a source string into a filter condition.
pub fn parse(source: &str) -> Result<FilterCondition, ParseError> {
    parser::parse(source)
}

/// Compile a parsed condition against a scope type and positional arguments.
pub fn compile(
    condition: &FilterCondition,
    scope: &ObjectType,
    args: &[Value],
) -> Result<Expression, CompileError> {
    compiler::compile(condition, scope, args)
}

/// Parse and compile a filter in one step.
pub fn parse_filter(
    source: &str,
    scope: &ObjectType,
    args: &[Value],
) -> Result<Expression, LangError> {
    let condition = parse(source)?;
    let expr = compile(&condition, scope, args)?;
    Ok(expr)
}

/// Tokenize a source string (for debugging/testing).
pub fn tokenize(source: &str) -> Result<Vec<lexer::SpannedToken>, ParseError> {
    lexer::tokenize(source)
}
