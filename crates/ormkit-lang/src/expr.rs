//! Compiled filter expressions.
//!
//! An [`Expression`] is self-contained: every field it references already
//! carries the attribute type needed to decode a raw record, so it can be
//! evaluated, normalized or shipped to an adapter without the schema.

use std::fmt;

use ormkit_proto::{AttributeType, ObjectType, Record, Value, ID_FIELD};

use crate::error::CompileErrorKind;

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    StartsWith,
    Contains,
    In,
    NotIn,
}

impl Operator {
    /// Source spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::StartsWith => "starts with",
            Operator::Contains => "contains",
            Operator::In => "in",
            Operator::NotIn => "not in",
        }
    }
}

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// The synthetic `id` field.
    Id,
    /// A typed attribute.
    Attribute { name: String, ty: AttributeType },
    /// The foreign id of a belongs-to relationship.
    Relation { name: String },
}

impl Field {
    /// Resolve a field name against a scope type.
    pub fn resolve(scope: &ObjectType, name: &str) -> Result<Field, CompileErrorKind> {
        if let Some(def) = scope.attribute(name) {
            return Ok(Field::Attribute {
                name: def.name.clone(),
                ty: def.ty,
            });
        }
        if scope.belongs_to_relationship(name).is_some() {
            return Ok(Field::Relation {
                name: name.to_string(),
            });
        }
        if name == ID_FIELD {
            return Ok(Field::Id);
        }
        if scope.has_many_relationship(name).is_some() {
            return Err(CompileErrorKind::HasManyFilter);
        }
        Err(CompileErrorKind::UnknownAttribute)
    }

    /// Field name as written in a filter.
    pub fn name(&self) -> &str {
        match self {
            Field::Id => ID_FIELD,
            Field::Attribute { name, .. } | Field::Relation { name } => name,
        }
    }

    /// Read the field's current value from a raw record.
    ///
    /// Undecodable attribute JSON reads as null.
    pub fn read(&self, record: &Record) -> Value {
        match self {
            Field::Id => Value::String(record.id.clone()),
            Field::Relation { name } => record
                .relation_id(name)
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
            Field::Attribute { name, ty } => record
                .attributes
                .get(name)
                .and_then(|json| ty.value_from_json(json).ok())
                .unwrap_or(Value::Null),
        }
    }
}

/// A single `field operator value` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub field: Field,
    pub op: Operator,
    pub value: Value,
}

impl Operation {
    /// Create an operation.
    pub fn new(field: Field, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A field test.
    Operation(Operation),
    /// Matches records whose belongs-to `relationship` points at `id`.
    /// Used for has-many reverse lookups.
    RelationMatch { relationship: String, id: String },
    /// All operands hold.
    And(Vec<Expression>),
    /// At least one operand holds.
    Or(Vec<Expression>),
    /// Always holds.
    True,
}

impl Expression {
    /// Combine expressions with `and`.
    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::And(operands)
    }

    /// Combine expressions with `or`.
    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::Or(operands)
    }

    /// Wrap a single operation.
    pub fn op(field: Field, op: Operator, value: impl Into<Value>) -> Self {
        Expression::Operation(Operation::new(field, op, value))
    }

    /// Equality on a field.
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::op(field, Operator::Eq, value)
    }

    /// Reverse lookup on a belongs-to relationship.
    pub fn relation_match(relationship: impl Into<String>, id: impl Into<String>) -> Self {
        Expression::RelationMatch {
            relationship: relationship.into(),
            id: id.into(),
        }
    }

    /// Conjoin another expression onto this one.
    ///
    /// `True` is the identity; an existing `And` is extended in place.
    pub fn and_also(self, other: Expression) -> Self {
        match self {
            Expression::True => other,
            Expression::And(mut operands) => {
                operands.push(other);
                Expression::And(operands)
            }
            current => Expression::And(vec![current, other]),
        }
    }

    /// Check if this is the trivially-true expression.
    pub fn is_true(&self) -> bool {
        matches!(self, Expression::True)
    }

    /// Evaluate the expression against one raw record.
    pub fn evaluate(&self, record: &Record) -> bool {
        match self {
            Expression::Operation(op) => op.evaluate(record),
            Expression::RelationMatch { relationship, id } => {
                record.relation_id(relationship) == Some(id.as_str())
            }
            Expression::And(operands) => operands.iter().all(|e| e.evaluate(record)),
            Expression::Or(operands) => operands.iter().any(|e| e.evaluate(record)),
            Expression::True => true,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, operands: &[Expression], sep: &str| {
            write!(f, "(")?;
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", operand)?;
            }
            write!(f, ")")
        };

        match self {
            Expression::Operation(op) => {
                write!(f, "{} {} {}", op.field.name(), op.op.as_str(), op.value)
            }
            Expression::RelationMatch { relationship, id } => {
                write!(f, "{} matches {:?}", relationship, id)
            }
            Expression::And(operands) => join(f, operands, "and"),
            Expression::Or(operands) => join(f, operands, "or"),
            Expression::True => write!(f, "true"),
        }
    }
}
