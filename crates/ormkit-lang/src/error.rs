//! Error types for parsing, compiling and normalizing filter expressions.

use crate::span::{offset_to_line_col, Span};
use thiserror::Error;

/// Lexical or syntactic error.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Offending character range.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&render_snippet(source, self.span));

        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }

        result
    }
}

/// Error while resolving a parsed filter against its scope type and arguments.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct CompileError {
    /// The error message.
    pub message: String,
    /// Offending character range (empty for map filters).
    pub span: Span,
    /// Error kind for programmatic handling.
    pub kind: CompileErrorKind,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Kinds of compilation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// Name is neither `id`, an attribute nor a belongs-to relationship.
    UnknownAttribute,
    /// A has-many relationship was used as a filter field.
    HasManyFilter,
    /// More placeholders than supplied arguments.
    MissingArgument,
    /// The argument does not fit the field or operator.
    InvalidOperand,
}

impl CompileError {
    /// Create a new compile error.
    pub fn new(message: impl Into<String>, span: Span, kind: CompileErrorKind) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
        }
    }

    /// Create an unknown attribute error.
    pub fn unknown_attribute(object_type: &str, name: &str, span: Span) -> Self {
        Self::new(
            format!("unknown attribute '{}' on type '{}'", name, object_type),
            span,
            CompileErrorKind::UnknownAttribute,
        )
    }

    /// Create a has-many filter error.
    pub fn has_many_filter(object_type: &str, name: &str, span: Span) -> Self {
        Self::new(
            format!(
                "has-many relationship '{}' on type '{}' cannot be used in a filter",
                name, object_type
            ),
            span,
            CompileErrorKind::HasManyFilter,
        )
    }

    /// Create a missing argument error.
    pub fn missing_argument(index: usize, supplied: usize, span: Span) -> Self {
        Self::new(
            format!(
                "placeholder #{} has no argument ({} supplied)",
                index + 1,
                supplied
            ),
            span,
            CompileErrorKind::MissingArgument,
        )
    }

    /// Create an invalid operand error.
    pub fn invalid_operand(message: impl Into<String>, span: Span) -> Self {
        Self::new(message, span, CompileErrorKind::InvalidOperand)
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut result = format!("error[{:?}]: {}\n", self.kind, self.message);
        result.push_str(&render_snippet(source, self.span));
        result
    }
}

/// DNF expansion exceeded its clause budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Too many conjunctive clauses.
    #[error("normalized expression exceeds {limit} clauses")]
    TooManyClauses { limit: usize },
}

/// A combined error type for the public API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LangError {
    /// Parse error.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Compile error.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
}

impl LangError {
    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        match self {
            LangError::Parse(e) => e.format_with_source(source),
            LangError::Compile(e) => e.format_with_source(source),
        }
    }

    /// Get the span of the error.
    pub fn span(&self) -> Span {
        match self {
            LangError::Parse(e) => e.span,
            LangError::Compile(e) => e.span,
        }
    }
}

/// Render the source line under `span` with a caret underline.
fn render_snippet(source: &str, span: Span) -> String {
    let (line, col) = offset_to_line_col(source, span.start);
    let mut result = format!("  --> line {}:{}\n", line, col);

    if let Some(source_line) = source.lines().nth(line - 1) {
        result.push_str(&format!("   |\n{:3}| {}\n   |", line, source_line));
        result.push_str(&" ".repeat(col));
        result.push('^');

        let room = source_line.len().saturating_sub(col);
        let underline = span.len().saturating_sub(1).min(room);
        result.push_str(&"~".repeat(underline));
        result.push('\n');
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_formatting() {
        let source = "model == ?";
        let err = ParseError::new("unexpected character '='", Span::new(7, 8))
            .with_hint("use '=' for equality");

        let formatted = err.format_with_source(source);
        assert!(formatted.contains("line 1:8"));
        assert!(formatted.contains("unexpected character"));
        assert!(formatted.contains("hint: use '=' for equality"));
    }

    #[test]
    fn test_compile_error_underline() {
        let source = "colour = ?";
        let err = CompileError::unknown_attribute("Phone", "colour", Span::new(0, 6));
        let formatted = err.format_with_source(source);
        assert!(formatted.contains("UnknownAttribute"));
        assert!(formatted.contains("^~~~~~"));
    }

    #[test]
    fn test_lang_error_span() {
        let err: LangError = CompileError::missing_argument(1, 1, Span::new(4, 5)).into();
        assert_eq!(err.span(), Span::new(4, 5));
    }
}
