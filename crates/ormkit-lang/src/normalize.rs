//! Disjunctive normal form.
//!
//! [`Expression::normalize`] rewrites any tree into `Or([And([..]), ..])` so
//! an adapter that can use one index per conjunctive clause can enumerate the
//! clauses directly. `in` is expanded into one equality clause per candidate
//! first. Leaves are never rewritten otherwise, so evaluation is unchanged.
//!
//! Distributing `and` over `or` is exponential for adversarial inputs; the
//! clause count is capped and exceeding the cap is an error.

use ormkit_proto::Value;

use crate::error::NormalizeError;
use crate::expr::{Expression, Operation, Operator};

/// Default clause cap used by [`Expression::normalize`].
pub const DEFAULT_MAX_CLAUSES: usize = 1024;

/// A conjunction of leaves; empty means "true".
type Clause = Vec<Expression>;

impl Expression {
    /// Normalize to DNF with the default clause cap.
    pub fn normalize(&self) -> Result<Expression, NormalizeError> {
        self.normalize_with_limit(DEFAULT_MAX_CLAUSES)
    }

    /// Normalize to DNF, failing if more than `limit` clauses would result.
    pub fn normalize_with_limit(&self, limit: usize) -> Result<Expression, NormalizeError> {
        let clauses = to_clauses(self, limit)?;
        Ok(Expression::Or(
            clauses
                .into_iter()
                .map(|clause| {
                    if clause.is_empty() {
                        Expression::And(vec![Expression::True])
                    } else {
                        Expression::And(clause)
                    }
                })
                .collect(),
        ))
    }

    /// Check the DNF shape: an `Or` whose operands are all `And`s of leaves.
    pub fn is_normalized(&self) -> bool {
        let Expression::Or(clauses) = self else {
            return false;
        };
        clauses.iter().all(|clause| match clause {
            Expression::And(leaves) => leaves
                .iter()
                .all(|leaf| !matches!(leaf, Expression::And(_) | Expression::Or(_))),
            _ => false,
        })
    }
}

fn to_clauses(expr: &Expression, limit: usize) -> Result<Vec<Clause>, NormalizeError> {
    let clauses = match expr {
        Expression::True => vec![Vec::new()],
        Expression::RelationMatch { .. } => vec![vec![expr.clone()]],
        Expression::Operation(op) => match (op.op, &op.value) {
            (Operator::In, Value::Array(candidates)) => candidates
                .iter()
                .map(|candidate| {
                    vec![Expression::Operation(Operation::new(
                        op.field.clone(),
                        Operator::Eq,
                        candidate.clone(),
                    ))]
                })
                .collect(),
            _ => vec![vec![expr.clone()]],
        },
        Expression::Or(operands) => {
            let mut clauses = Vec::new();
            for operand in operands {
                clauses.extend(to_clauses(operand, limit)?);
                check(clauses.len(), limit)?;
            }
            clauses
        }
        Expression::And(operands) => {
            let mut acc: Vec<Clause> = vec![Vec::new()];
            for operand in operands {
                let right = to_clauses(operand, limit)?;
                check(acc.len().saturating_mul(right.len()), limit)?;
                acc = cross(&acc, &right);
            }
            acc
        }
    };
    check(clauses.len(), limit)?;
    Ok(clauses)
}

/// Cartesian product of two clause lists.
fn cross(left: &[Clause], right: &[Clause]) -> Vec<Clause> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut clause = Vec::with_capacity(l.len() + r.len());
            clause.extend(l.iter().cloned());
            clause.extend(r.iter().cloned());
            out.push(clause);
        }
    }
    out
}

fn check(count: usize, limit: usize) -> Result<(), NormalizeError> {
    if count > limit {
        return Err(NormalizeError::TooManyClauses { limit });
    }
    Ok(())
}
