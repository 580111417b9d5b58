//! Boundary error types.

use thiserror::Error;

/// An attribute was assigned a value its type cannot represent.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot cast {value} to {expected} for attribute '{attribute}'")]
pub struct CastError {
    /// Attribute being assigned (empty when casting outside an attribute).
    pub attribute: String,
    /// Name of the target type.
    pub expected: &'static str,
    /// Rendered offending value.
    pub value: String,
}

impl CastError {
    /// Create a new cast error.
    pub fn new(expected: &'static str, value: impl std::fmt::Display) -> Self {
        Self {
            attribute: String::new(),
            expected,
            value: value.to_string(),
        }
    }

    /// Attach the attribute name.
    pub fn for_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }
}
