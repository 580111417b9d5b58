//! In-memory evaluation of filter operations against raw records.
//!
//! [`compare`] is the total order used by every operator and by adapters that
//! sort in memory. It returns `None` when two values are incomparable; the
//! equality operators then fall back to [`loose_eq`], ordering operators fail.

use std::cmp::Ordering;

use ormkit_proto::schema::parse_day;
use ormkit_proto::{Record, Value};

use crate::expr::{Operation, Operator};

/// Compare two values.
///
/// Rules, in priority order:
/// - null sorts before everything else, two nulls are equal
/// - two numbers compare numerically
/// - two strings compare case-insensitively
/// - two timestamps compare with sub-second precision discarded
/// - if either side is a day, both sides are converted to days; a side
///   that cannot be converted makes the pair incomparable
/// - two arrays compare element-wise; different lengths are incomparable
/// - anything else is incomparable
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        _ if a.is_number() && b.is_number() => compare_numbers(a, b),
        (Value::String(x), Value::String(y)) => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.timestamp().cmp(&y.timestamp())),
        (Value::Day(_), _) | (_, Value::Day(_)) => {
            let x = as_day(a)?;
            let y = as_day(b)?;
            Some(x.cmp(&y))
        }
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                return None;
            }
            for (left, right) in x.iter().zip(y) {
                match compare(left, right)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(Ordering::Equal)
        }
        _ => None,
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn as_day(value: &Value) -> Option<chrono::NaiveDate> {
    match value {
        Value::Day(d) => Some(*d),
        Value::DateTime(t) => Some(t.date_naive()),
        Value::String(s) => parse_day(s),
        _ => None,
    }
}

/// Loose equality for values [`compare`] cannot order.
///
/// Numbers match numeric strings, booleans match 0/1, JSON documents match
/// by their serialized form.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), n) | (n, Value::String(s)) if n.is_number() => s
            .trim()
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .is_some_and(|(x, y)| x == y),
        (Value::Bool(flag), n) | (n, Value::Bool(flag)) if n.is_number() => {
            n.as_f64() == Some(if *flag { 1.0 } else { 0.0 })
        }
        (Value::Json(_), _) | (_, Value::Json(_)) => a.to_json() == b.to_json(),
        _ => a == b,
    }
}

/// Equality as the `=` operator sees it.
pub fn values_match(a: &Value, b: &Value) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => loose_eq(a, b),
    }
}

impl Operator {
    /// Apply the operator to a field value and an operand.
    pub fn apply(&self, actual: &Value, operand: &Value) -> bool {
        match self {
            Operator::Eq => values_match(actual, operand),
            Operator::Ne => !values_match(actual, operand),
            Operator::Gt => compare(actual, operand) == Some(Ordering::Greater),
            Operator::Lt => compare(actual, operand) == Some(Ordering::Less),
            Operator::Ge => matches!(
                compare(actual, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Le => matches!(
                compare(actual, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Contains => match (actual, operand) {
                (Value::String(hay), Value::String(needle)) => {
                    hay.to_lowercase().contains(&needle.to_lowercase())
                }
                (Value::Array(items), Value::Array(wanted)) => wanted
                    .iter()
                    .all(|w| items.iter().any(|item| values_match(item, w))),
                (Value::Array(items), wanted) => {
                    items.iter().any(|item| values_match(item, wanted))
                }
                _ => false,
            },
            Operator::StartsWith => match (actual, operand) {
                (Value::String(hay), Value::String(prefix)) => {
                    hay.to_lowercase().starts_with(&prefix.to_lowercase())
                }
                (Value::Array(items), Value::Array(prefix)) => {
                    prefix.len() <= items.len()
                        && items.iter().zip(prefix).all(|(a, b)| values_match(a, b))
                }
                (Value::Array(items), first) => {
                    items.first().is_some_and(|item| values_match(item, first))
                }
                _ => false,
            },
            Operator::In => match operand {
                Value::Array(candidates) => candidates.iter().any(|c| values_match(actual, c)),
                _ => false,
            },
            Operator::NotIn => match operand {
                Value::Array(candidates) => !candidates.iter().any(|c| values_match(actual, c)),
                _ => false,
            },
        }
    }
}

impl Operation {
    /// Evaluate this operation against a raw record.
    pub fn evaluate(&self, record: &Record) -> bool {
        let actual = self.field.read(record);
        self.op.apply(&actual, &self.value)
    }
}
