//! Syntax tree for textual filters, before names and arguments are resolved.

use crate::expr::Operator;
use crate::span::{Span, Spanned};

/// A parsed filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// `field operator ?`.
    Comparison {
        field: Spanned<String>,
        op: Spanned<Operator>,
        /// Zero-based placeholder index, assigned left to right.
        placeholder: Spanned<usize>,
    },
    /// Logical AND of conditions.
    And(Vec<FilterCondition>),
    /// Logical OR of conditions.
    Or(Vec<FilterCondition>),
}

impl FilterCondition {
    /// Get the span of this condition.
    pub fn span(&self) -> Span {
        match self {
            FilterCondition::Comparison {
                field, placeholder, ..
            } => field.span.merge(placeholder.span),
            FilterCondition::And(conditions) | FilterCondition::Or(conditions) => conditions
                .iter()
                .map(FilterCondition::span)
                .reduce(Span::merge)
                .unwrap_or_default(),
        }
    }

    /// Number of placeholders in this condition.
    pub fn placeholder_count(&self) -> usize {
        match self {
            FilterCondition::Comparison { .. } => 1,
            FilterCondition::And(conditions) | FilterCondition::Or(conditions) => {
                conditions.iter().map(FilterCondition::placeholder_count).sum()
            }
        }
    }
}
