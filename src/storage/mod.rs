//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Record and value representation
//! - Backing store interface
//! - File-backed and in-memory stores
//! - Tables

pub mod disk;
pub mod memory;
pub mod record;
pub mod store;
pub mod table;

pub use disk::FileBackend;
pub use memory::MemoryBackend;
pub use record::{decode_record, encode_record, record, Record, Value};
pub use store::{with_store, KvStore, StorageBackend};
pub use table::Table;
