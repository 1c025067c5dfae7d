//! Query execution module
//!
//! This module contains the predicate evaluator and the criteria parser.

pub mod parser;
pub mod predicate;

pub use parser::{parse_criteria, parse_criterion};
pub use predicate::{compare_values, matches, Operator, SelectionCriterion};
