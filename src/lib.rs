//! RecStore - A minimal embedded record store written in Rust
//!
//! This library provides the components of a small keyed record store:
//! - Records of named, dynamically typed values
//! - Tables with a unique key field, backed by append-only log files
//! - Conjunctive selection criteria and a parser for them
//! - A persisted catalog of table definitions
//!
//! ```no_run
//! use recstore::{record, Database, DatabaseConfig, Field, SelectionCriterion};
//!
//! # fn main() -> recstore::Result<()> {
//! let mut db = Database::open(DatabaseConfig::new().data_dir("./data"))?;
//! let users = db.create_table("users", vec![Field::any("id"), Field::any("name")], "id")?;
//! users.insert(&record([("id", "u1"), ("name", "Alice")]))?;
//! let found = users.query(&[SelectionCriterion::equals("name", "Alice")])?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod storage;

pub use catalog::{Field, FieldType, TableDef};
pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{Error, Result};
pub use executor::{parse_criteria, Operator, SelectionCriterion};
pub use storage::{record, Record, Table, Value};
