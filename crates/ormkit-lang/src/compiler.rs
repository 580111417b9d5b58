//! Compiler from parsed filters to [`Expression`]s.
//!
//! Compilation resolves every field name against the scope type, binds
//! positional arguments to placeholders and casts comparison operands through
//! the attribute's type, so that evaluation never has to consult the schema.

use ormkit_proto::{AttributeType, ObjectType, Value};
use tracing::trace;

use crate::ast::FilterCondition;
use crate::error::{CompileError, CompileErrorKind};
use crate::expr::{Expression, Field, Operation, Operator};
use crate::span::{Span, Spanned};

/// Compiles a [`FilterCondition`] against a scope type and an argument list.
pub struct Compiler<'a> {
    scope: &'a ObjectType,
    args: &'a [Value],
}

impl<'a> Compiler<'a> {
    /// Create a new compiler.
    pub fn new(scope: &'a ObjectType, args: &'a [Value]) -> Self {
        Self { scope, args }
    }

    /// Compile a parsed condition.
    pub fn compile(&self, condition: &FilterCondition) -> Result<Expression, CompileError> {
        match condition {
            FilterCondition::Comparison {
                field,
                op,
                placeholder,
            } => {
                let resolved = self.resolve(field)?;
                let arg = self.args.get(placeholder.value).ok_or_else(|| {
                    CompileError::missing_argument(
                        placeholder.value,
                        self.args.len(),
                        placeholder.span,
                    )
                })?;
                let value = bind_operand(&resolved, op.value, arg, placeholder.span)?;
                Ok(Expression::Operation(Operation::new(resolved, op.value, value)))
            }
            FilterCondition::And(conditions) => Ok(Expression::And(
                conditions
                    .iter()
                    .map(|c| self.compile(c))
                    .collect::<Result<_, _>>()?,
            )),
            FilterCondition::Or(conditions) => Ok(Expression::Or(
                conditions
                    .iter()
                    .map(|c| self.compile(c))
                    .collect::<Result<_, _>>()?,
            )),
        }
    }

    fn resolve(&self, field: &Spanned<String>) -> Result<Field, CompileError> {
        Field::resolve(self.scope, &field.value).map_err(|kind| match kind {
            CompileErrorKind::HasManyFilter => {
                CompileError::has_many_filter(&self.scope.name, &field.value, field.span)
            }
            _ => CompileError::unknown_attribute(&self.scope.name, &field.value, field.span),
        })
    }
}

/// Check and convert an argument for use as the operand of `op` on `field`.
fn bind_operand(
    field: &Field,
    op: Operator,
    arg: &Value,
    span: Span,
) -> Result<Value, CompileError> {
    match op {
        Operator::Contains | Operator::StartsWith => Ok(arg.clone()),
        Operator::In | Operator::NotIn => {
            let Value::Array(candidates) = arg else {
                return Err(CompileError::invalid_operand(
                    format!(
                        "'{}' on '{}' needs an array argument, got {}",
                        op.as_str(),
                        field.name(),
                        arg.kind()
                    ),
                    span,
                ));
            };
            candidates
                .iter()
                .map(|candidate| cast_scalar(field, candidate, span))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        _ => cast_scalar(field, arg, span),
    }
}

fn cast_scalar(field: &Field, value: &Value, span: Span) -> Result<Value, CompileError> {
    match field {
        // Day operands compare against timestamps at day granularity.
        Field::Attribute {
            ty: AttributeType::DateTime,
            ..
        } if matches!(value, Value::Day(_)) => Ok(value.clone()),
        Field::Attribute { name, ty } => ty
            .cast(value)
            .or_else(|e| widen_operand(ty, value).ok_or(e))
            .map_err(|e| {
                CompileError::invalid_operand(e.for_attribute(name.clone()).to_string(), span)
            }),
        Field::Id | Field::Relation { .. } => match value {
            Value::String(_) | Value::Null => Ok(value.clone()),
            other => Err(CompileError::invalid_operand(
                format!("'{}' compares against ids, got {}", field.name(), other.kind()),
                span,
            )),
        },
    }
}

/// Operands that do not fit the attribute type but still bound it, such as
/// `units > 99.5` on an integer or a plain date against a timestamp.
fn widen_operand(ty: &AttributeType, value: &Value) -> Option<Value> {
    match ty {
        AttributeType::Integer => AttributeType::Number.cast(value).ok(),
        AttributeType::DateTime => AttributeType::Day.cast(value).ok(),
        _ => None,
    }
}

/// Compile a parsed condition against a scope type.
pub fn compile(
    condition: &FilterCondition,
    scope: &ObjectType,
    args: &[Value],
) -> Result<Expression, CompileError> {
    if args.len() > condition.placeholder_count() {
        trace!(
            object_type = %scope.name,
            supplied = args.len(),
            used = condition.placeholder_count(),
            "ignoring unused filter arguments"
        );
    }
    Compiler::new(scope, args).compile(condition)
}

/// Build an `And` of equalities from name/value pairs.
///
/// Unknown names fail immediately. Errors carry an empty span.
pub fn compile_map<K, I>(scope: &ObjectType, entries: I) -> Result<Expression, CompileError>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, Value)>,
{
    let compiler = Compiler::new(scope, &[]);
    let mut operands = Vec::new();
    for (name, value) in entries {
        let name = Spanned::new(name.as_ref().to_string(), Span::default());
        let field = compiler.resolve(&name)?;
        let value = cast_scalar(&field, &value, Span::default())?;
        operands.push(Expression::Operation(Operation::new(
            field,
            Operator::Eq,
            value,
        )));
    }
    Ok(Expression::And(operands))
}
