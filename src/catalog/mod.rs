//! Catalog module
//!
//! This module contains the persisted catalog, table definitions, and field types.

pub mod catalog;
pub mod schema;
pub mod types;

pub use catalog::Catalog;
pub use schema::{Field, TableDef};
pub use types::FieldType;
