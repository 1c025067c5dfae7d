//! Error types for RecStore
//!
//! This module defines all error types used throughout the record store.

use thiserror::Error;

/// The main error type for RecStore
#[derive(Error, Debug)]
pub enum Error {
    // ========== Record Errors ==========
    #[error("Record error: key field '{0}' is missing")]
    MissingKey(String),

    #[error("Record error: key '{0}' already exists")]
    DuplicateKey(String),

    #[error("Record error: key '{0}' not found")]
    KeyNotFound(String),

    #[error("Record error: key field '{0}' cannot be changed by an update")]
    KeyFieldImmutable(String),

    #[error("Record error: field '{0}' not found in table '{1}'")]
    UnknownField(String, String),

    #[error("Record error: field '{0}' holds a non-finite float, which cannot be stored")]
    NonFiniteFloat(String),

    // ========== Table Lifecycle Errors ==========
    #[error("Catalog error: table '{0}' already exists")]
    DuplicateTable(String),

    #[error("Catalog error: key field '{0}' is not among the fields of table '{1}'")]
    InvalidKey(String, String),

    #[error("Catalog error: table '{0}' not found")]
    UnknownTable(String),

    #[error("Catalog error: invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("Unsupported operation: {0}")]
    NotSupported(String),

    // ========== Criteria Errors ==========
    #[error("Criteria error: invalid operator '{0}'")]
    InvalidOperator(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ========== Storage Errors ==========
    #[error("Storage error: corrupted store '{0}': {1}")]
    CorruptedStore(String, String),

    #[error("Storage error: entry of {0} bytes exceeds the store frame limit")]
    EntryTooLarge(usize),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for RecStore operations
pub type Result<T> = std::result::Result<T, Error>;
