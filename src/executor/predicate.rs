//! Predicate evaluation
//!
//! A predicate is a conjunction of field comparisons. Values are compared
//! natively when their types allow it and by canonical text otherwise.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::storage::{Record, Value};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    /// Apply the operator to an ordering
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Neq => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Gte => ordering != Ordering::Less,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Neq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            other => Err(Error::InvalidOperator(other.to_string())),
        }
    }
}

/// A single `field <op> value` criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriterion {
    pub field_name: String,
    pub operator: Operator,
    pub value: Value,
}

impl SelectionCriterion {
    pub fn new(field_name: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value: value.into(),
        }
    }

    /// Shorthand for an equality criterion
    pub fn equals(field_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field_name, Operator::Eq, value)
    }

    /// Evaluate against one record. A field the record lacks is vacuously satisfied.
    pub fn matches(&self, record: &Record) -> bool {
        match record.get(&self.field_name) {
            Some(actual) => self.operator.holds(compare_values(actual, &self.value)),
            None => true,
        }
    }
}

impl fmt::Display for SelectionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field_name, self.operator, self.value)
    }
}

/// Native comparison, falling back to the canonical text forms
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    left.compare(right)
        .unwrap_or_else(|| left.to_string().cmp(&right.to_string()))
}

/// True iff every criterion holds for the record
pub fn matches(record: &Record, criteria: &[SelectionCriterion]) -> bool {
    criteria.iter().all(|c| c.matches(record))
}
