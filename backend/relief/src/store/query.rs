//! Query constraints evaluated over JSON documents.
//!
//! Both backends load a collection and filter it in process. This is fine at
//! the scale the application runs at; there is no index support.

use std::cmp::Ordering;

use serde_json::Value;

use super::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field value equals one of the values in the given array.
    In,
    /// Field is an array containing the given value.
    ArrayContains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryConstraint {
    Where {
        field: String,
        op: FilterOp,
        value: Value,
    },
    OrderBy {
        field: String,
        direction: Direction,
    },
    Limit(usize),
}

impl QueryConstraint {
    pub fn where_eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Where {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn where_op(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self::Where {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn order_by(field: &str, direction: Direction) -> Self {
        Self::OrderBy {
            field: field.to_string(),
            direction,
        }
    }
}

/// Filter, then order, then limit, regardless of the order the constraints
/// were given in.
pub fn apply_constraints(mut docs: Vec<Document>, constraints: &[QueryConstraint]) -> Vec<Document> {
    for c in constraints {
        if let QueryConstraint::Where { field, op, value } = c {
            docs.retain(|d| matches(field_value(d, field).as_ref(), *op, value));
        }
    }

    let orderings: Vec<(&str, Direction)> = constraints
        .iter()
        .filter_map(|c| match c {
            QueryConstraint::OrderBy { field, direction } => Some((field.as_str(), *direction)),
            _ => None,
        })
        .collect();
    if !orderings.is_empty() {
        docs.sort_by(|a, b| {
            for (field, direction) in &orderings {
                let ord = compare(field_value(a, field).as_ref(), field_value(b, field).as_ref());
                let ord = match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let limit = constraints
        .iter()
        .filter_map(|c| match c {
            QueryConstraint::Limit(n) => Some(*n),
            _ => None,
        })
        .min();
    if let Some(n) = limit {
        docs.truncate(n);
    }
    docs
}

/// `id` resolves to the document identifier; anything else to a top-level field.
fn field_value(doc: &Document, field: &str) -> Option<Value> {
    if field == "id" {
        return Some(Value::String(doc.id.clone()));
    }
    doc.data.get(field).cloned()
}

fn matches(actual: Option<&Value>, op: FilterOp, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return op == FilterOp::Ne && !expected.is_null();
    };
    match op {
        FilterOp::Eq => actual == expected,
        FilterOp::Ne => actual != expected,
        FilterOp::Lt => comparable(actual, expected) && compare(Some(actual), Some(expected)) == Ordering::Less,
        FilterOp::Le => comparable(actual, expected) && compare(Some(actual), Some(expected)) != Ordering::Greater,
        FilterOp::Gt => comparable(actual, expected) && compare(Some(actual), Some(expected)) == Ordering::Greater,
        FilterOp::Ge => comparable(actual, expected) && compare(Some(actual), Some(expected)) != Ordering::Less,
        FilterOp::In => expected
            .as_array()
            .is_some_and(|candidates| candidates.contains(actual)),
        FilterOp::ArrayContains => actual
            .as_array()
            .is_some_and(|items| items.contains(expected)),
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

/// Missing values sort first, then by type, then by value.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .zip(y.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y))
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
